//! Command-line parsing: tokenization, redirection extraction, and
//! pipeline splitting.
//!
//! A request line becomes a pipeline of 1..3 [`Command`]s. Any parse
//! failure is reported as a [`ParseError`]; callers must not execute a
//! `Command` that came from a failed parse.

use std::fmt;

/// At most this many pipeline segments are kept; anything past the third
/// `|`-separated fragment is silently dropped (spec: "beyond that the
/// surplus is dropped").
pub const MAX_PIPELINE_COMMANDS: usize = 3;

/// A single parsed command: a non-empty argument list plus optional
/// redirections.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    pub arguments: Vec<String>,
    pub input_file: Option<String>,
    pub output_file: Option<String>,
    pub error_file: Option<String>,
    pub append_output: bool,
}

impl Command {
    pub fn program(&self) -> &str {
        self.arguments.first().map(String::as_str).unwrap_or("")
    }
}

/// The distinct ways a request line can fail to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    EmptyPipeSegment,
    MissingCommandAfterPipe,
    MissingInputFile,
    MissingOutputFile,
    MissingErrorFile,
    EmptyArgumentBeforeInputRedirection,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ParseError::EmptyPipeSegment => "Empty command between pipes",
            ParseError::MissingCommandAfterPipe => "Missing command after pipe",
            ParseError::MissingInputFile => "Missing input file for redirection",
            ParseError::MissingOutputFile => "Missing output file for redirection",
            ParseError::MissingErrorFile => "Missing error redirection file",
            ParseError::EmptyArgumentBeforeInputRedirection => {
                "Empty argument before input redirection"
            }
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ParseError {}

/// States for the per-command tokenizer state machine.
enum State {
    /// Between tokens — whitespace is skipped.
    Normal,
    /// Building an unquoted word — whitespace ends it.
    InWord,
    /// Inside double quotes — whitespace is preserved.
    InDoubleQuote,
    /// Inside single quotes — everything is literal.
    InSingleQuote,
}

/// Split a command fragment into whitespace-delimited tokens, honoring
/// single/double quoting. A quote that is never closed extends to the end
/// of the string rather than erroring (spec: "unterminated quotes are
/// treated as extending to end of string").
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut state = State::Normal;

    for ch in input.chars() {
        match (&state, ch) {
            (State::Normal, ' ' | '\t') => {}
            (State::Normal, '"') => state = State::InDoubleQuote,
            (State::Normal, '\'') => state = State::InSingleQuote,
            (State::Normal, c) => {
                current.push(c);
                state = State::InWord;
            }

            (State::InWord, ' ' | '\t') => {
                tokens.push(std::mem::take(&mut current));
                state = State::Normal;
            }
            (State::InWord, '"') => state = State::InDoubleQuote,
            (State::InWord, '\'') => state = State::InSingleQuote,
            (State::InWord, c) => current.push(c),

            (State::InDoubleQuote, '"') => state = State::InWord,
            (State::InDoubleQuote, c) => current.push(c),

            (State::InSingleQuote, '\'') => state = State::InWord,
            (State::InSingleQuote, c) => current.push(c),
        }
    }

    if !current.is_empty() || matches!(state, State::InDoubleQuote | State::InSingleQuote) {
        tokens.push(current);
    }

    tokens
}

/// Parse one pipeline fragment (no `|`) into a [`Command`].
///
/// Redirection tokens are recognized left-to-right among the fragment's
/// tokens: `<` sets `input_file`, `>` and `>>` set `output_file`
/// (truncate/append), `2>` sets `error_file`. A `<` seen before any
/// argument token is rejected.
pub fn parse_command(fragment: &str) -> Result<Command, ParseError> {
    let tokens = tokenize(fragment);
    let mut cmd = Command::default();
    let mut i = 0;

    while i < tokens.len() {
        let token = tokens[i].as_str();
        match token {
            "<" => {
                if cmd.arguments.is_empty() {
                    return Err(ParseError::EmptyArgumentBeforeInputRedirection);
                }
                i += 1;
                match tokens.get(i).filter(|s| !s.is_empty()) {
                    Some(n) => cmd.input_file = Some(n.clone()),
                    None => return Err(ParseError::MissingInputFile),
                }
            }
            ">" => {
                i += 1;
                match tokens.get(i).filter(|s| !s.is_empty()) {
                    Some(n) => {
                        cmd.output_file = Some(n.clone());
                        cmd.append_output = false;
                    }
                    None => return Err(ParseError::MissingOutputFile),
                }
            }
            ">>" => {
                i += 1;
                match tokens.get(i).filter(|s| !s.is_empty()) {
                    Some(n) => {
                        cmd.output_file = Some(n.clone());
                        cmd.append_output = true;
                    }
                    None => return Err(ParseError::MissingOutputFile),
                }
            }
            "2>" => {
                i += 1;
                match tokens.get(i).filter(|s| !s.is_empty()) {
                    Some(n) => cmd.error_file = Some(n.clone()),
                    None => return Err(ParseError::MissingErrorFile),
                }
            }
            _ => cmd.arguments.push(token.to_string()),
        }
        i += 1;
    }

    Ok(cmd)
}

/// Split a request line on `|` into up to [`MAX_PIPELINE_COMMANDS`]
/// commands and parse each fragment.
///
/// Leading/trailing whitespace in each fragment is stripped before
/// tokenizing. An empty fragment between two pipes is rejected; so is a
/// trailing `|` with nothing but whitespace after it.
pub fn parse_line(line: &str) -> Result<Vec<Command>, ParseError> {
    if line.trim().ends_with('|') {
        return Err(ParseError::MissingCommandAfterPipe);
    }

    let mut commands = Vec::new();
    for (idx, fragment) in line.split('|').enumerate() {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Err(ParseError::EmptyPipeSegment);
        }
        if idx < MAX_PIPELINE_COMMANDS {
            commands.push(parse_command(fragment)?);
        }
        // idx >= MAX_PIPELINE_COMMANDS: surplus segment, dropped silently.
    }

    Ok(commands)
}
