//! Server-process builtins recognized on the inline execution path.
//!
//! `cd` and `exit` apply to the server process itself, so they run
//! directly in the session thread rather than in a forked child —
//! a forked child's working directory change or exit never outlives
//! the child, so running them there would make both builtins no-ops.

use std::io::Write;

const BUILTINS: &[&str] = &["cd", "exit"];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Result of running a builtin on the inline path.
pub enum BuiltinOutcome {
    /// Ran to completion; `code` is reported the way a child's exit
    /// status would be.
    Ran { code: i32 },
    /// `exit`: this session should terminate the same way the bare
    /// `exit` keyword in the wire protocol does.
    EndSession,
}

/// Execute `cd`/`exit`, writing any diagnostic into `diagnostics` (the
/// same byte stream that would otherwise carry a child's stderr, so the
/// client sees it in its response).
pub fn execute(program: &str, args: &[String], diagnostics: &mut dyn Write) -> BuiltinOutcome {
    match program {
        "cd" => BuiltinOutcome::Ran {
            code: builtin_cd(args, diagnostics),
        },
        "exit" => BuiltinOutcome::EndSession,
        _ => BuiltinOutcome::Ran { code: 127 },
    }
}

fn builtin_cd(args: &[String], diagnostics: &mut dyn Write) -> i32 {
    let target = match args.first() {
        Some(dir) => dir.clone(),
        None => std::env::var("HOME").unwrap_or_else(|_| "/".to_string()),
    };

    if let Err(e) = std::env::set_current_dir(&target) {
        let _ = writeln!(diagnostics, "cd: {target}: {e}");
        return 1;
    }
    0
}
