//! Runs a single command or a short pipeline as child process(es),
//! wiring redirections and inter-stage pipes, and streams the combined
//! stdout+stderr back to a sink synchronously.
//!
//! Used by the session handler for the *inline* path. Managed tasks do
//! not go through here — they are spawned directly by the scheduler
//! (`scheduler.rs`) via `/bin/sh -c`.
//!
//! Redirection targets are opened in the parent before `spawn()` rather
//! than inside a raw-forked child, so an open failure is observed here
//! rather than as a child exit status. The externally visible contract
//! is preserved regardless: a diagnostic line reaches the client and
//! the response still completes, by writing straight into the sink and
//! never spawning that stage.

use os_pipe::{PipeReader, PipeWriter, pipe};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::process::{Child, Command as Process, Stdio};

use crate::parser::Command;
use crate::status;

/// Run a single parsed command, forwarding its combined stdout+stderr to
/// `sink`. Returns the shell-style exit code; the caller does not
/// interpret it beyond logging.
pub fn execute_single(cmd: &Command, sink: &mut dyn Write) -> i32 {
    let (reader, writer) = match pipe() {
        Ok(pair) => pair,
        Err(e) => {
            let _ = writeln!(sink, "shelld: failed to create pipe: {e}");
            return 1;
        }
    };

    let stdin_stdio = match open_stdin(cmd, sink) {
        Ok(Some(stdio)) => stdio,
        Ok(None) => Stdio::null(),
        Err(()) => return 1,
    };

    let stdout_stdio = match open_output(&cmd.output_file, cmd.append_output, &writer, sink) {
        Ok(stdio) => stdio,
        Err(()) => return 1,
    };

    let stderr_stdio = match open_error(&cmd.error_file, &writer, sink) {
        Ok(stdio) => stdio,
        Err(()) => return 1,
    };

    let mut process = Process::new(cmd.program());
    process.args(&cmd.arguments[1..]);
    process.stdin(stdin_stdio).stdout(stdout_stdio).stderr(stderr_stdio);

    let child = match process.spawn() {
        Ok(child) => child,
        Err(e) => {
            let _ = writeln!(sink, "shelld: {}: {e}", cmd.program());
            return command_spawn_error_code(&e);
        }
    };

    drop(writer);
    pump_to_sink(reader, sink);
    wait_one(child)
}

/// Run a pipeline of 1..=3 commands. Only the first command's
/// `input_file` and the last command's `output_file`/`append_output`/
/// `error_file` are honored; inner stages inherit the overall capture
/// stream for both stdout and stderr.
pub fn execute_pipeline(cmds: &[Command], sink: &mut dyn Write) -> i32 {
    if cmds.len() == 1 {
        return execute_single(&cmds[0], sink);
    }

    let (capture_reader, capture_writer) = match pipe() {
        Ok(pair) => pair,
        Err(e) => {
            let _ = writeln!(sink, "shelld: failed to create pipe: {e}");
            return 1;
        }
    };

    let mut children: Vec<Child> = Vec::new();
    let mut prev_stage_reader: Option<PipeReader> = None;
    let last = cmds.len() - 1;

    for (idx, cmd) in cmds.iter().enumerate() {
        let is_last = idx == last;

        let stdin_stdio = if idx == 0 {
            match open_stdin(cmd, sink) {
                Ok(Some(stdio)) => stdio,
                Ok(None) => Stdio::null(),
                Err(()) => {
                    wait_all(children);
                    return 1;
                }
            }
        } else {
            match prev_stage_reader.take() {
                Some(reader) => Stdio::from(reader),
                None => Stdio::null(),
            }
        };

        let (stdout_stdio, next_reader) = if is_last {
            let stdio = match open_output(&cmd.output_file, cmd.append_output, &capture_writer, sink) {
                Ok(stdio) => stdio,
                Err(()) => {
                    wait_all(children);
                    return 1;
                }
            };
            (stdio, None)
        } else {
            match pipe() {
                Ok((reader, writer)) => (Stdio::from(writer), Some(reader)),
                Err(e) => {
                    let _ = writeln!(sink, "shelld: failed to create pipe: {e}");
                    wait_all(children);
                    return 1;
                }
            }
        };

        let stderr_stdio = if is_last {
            match open_error(&cmd.error_file, &capture_writer, sink) {
                Ok(stdio) => stdio,
                Err(()) => {
                    wait_all(children);
                    return 1;
                }
            }
        } else {
            clone_writer_stdio(&capture_writer, sink).unwrap_or(Stdio::null())
        };

        let mut process = Process::new(cmd.program());
        process.args(&cmd.arguments[1..]);
        process.stdin(stdin_stdio).stdout(stdout_stdio).stderr(stderr_stdio);

        match process.spawn() {
            Ok(child) => children.push(child),
            Err(e) => {
                let _ = writeln!(sink, "shelld: {}: {e}", cmd.program());
                wait_all(children);
                return command_spawn_error_code(&e);
            }
        }

        prev_stage_reader = next_reader;
    }

    drop(capture_writer);
    pump_to_sink(capture_reader, sink);

    let mut last_code = 0;
    for child in children {
        last_code = wait_one(child);
    }
    last_code
}

fn open_stdin(cmd: &Command, sink: &mut dyn Write) -> Result<Option<Stdio>, ()> {
    match &cmd.input_file {
        None => Ok(None),
        Some(path) => match File::open(path) {
            Ok(file) => Ok(Some(Stdio::from(file))),
            Err(e) => {
                let _ = writeln!(sink, "shelld: {path}: {e}");
                Err(())
            }
        },
    }
}

fn open_output(
    output_file: &Option<String>,
    append: bool,
    capture_writer: &PipeWriter,
    sink: &mut dyn Write,
) -> Result<Stdio, ()> {
    match output_file {
        None => clone_writer_stdio(capture_writer, sink),
        Some(path) => {
            let opened = if append {
                OpenOptions::new().create(true).append(true).open(path)
            } else {
                OpenOptions::new().create(true).write(true).truncate(true).open(path)
            };
            match opened {
                Ok(file) => Ok(Stdio::from(file)),
                Err(e) => {
                    let _ = writeln!(sink, "shelld: {path}: {e}");
                    Err(())
                }
            }
        }
    }
}

fn open_error(
    error_file: &Option<String>,
    capture_writer: &PipeWriter,
    sink: &mut dyn Write,
) -> Result<Stdio, ()> {
    match error_file {
        None => clone_writer_stdio(capture_writer, sink),
        Some(path) => match OpenOptions::new().create(true).write(true).truncate(true).open(path) {
            Ok(file) => Ok(Stdio::from(file)),
            Err(e) => {
                let _ = writeln!(sink, "shelld: {path}: {e}");
                Err(())
            }
        },
    }
}

fn clone_writer_stdio(writer: &PipeWriter, sink: &mut dyn Write) -> Result<Stdio, ()> {
    match writer.try_clone() {
        Ok(w) => Ok(Stdio::from(w)),
        Err(e) => {
            let _ = writeln!(sink, "shelld: failed to duplicate pipe: {e}");
            Err(())
        }
    }
}

fn pump_to_sink(mut reader: PipeReader, sink: &mut dyn Write) {
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if sink.write_all(&buf[..n]).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}

fn wait_one(mut child: Child) -> i32 {
    match child.wait() {
        Ok(st) => status::exit_code(st),
        Err(_) => 1,
    }
}

fn wait_all(children: Vec<Child>) {
    for mut child in children {
        let _ = child.wait();
    }
}

fn command_spawn_error_code(e: &io::Error) -> i32 {
    if e.kind() == io::ErrorKind::NotFound {
        127
    } else {
        126
    }
}
