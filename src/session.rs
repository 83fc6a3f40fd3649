//! Per-client session: one thread per accepted connection, classifying
//! each request as a managed task or an inline command.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use crate::builtins::{self, BuiltinOutcome};
use crate::executor;
use crate::parser::{self, Command};
use crate::queue::TaskQueue;
use crate::signals;
use crate::task::TaskRecord;

const REQUEST_BUFFER_SIZE: usize = 1024;
const END_SENTINEL: &[u8] = b"__END__";

pub fn handle(client_id: u64, mut stream: TcpStream, queue: Arc<TaskQueue>) {
    println!("[{client_id}]<<< client connected");

    loop {
        let mut buf = [0u8; REQUEST_BUFFER_SIZE];
        let n = match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };

        let line = String::from_utf8_lossy(&buf[..n]);
        let line = line.trim_end_matches(['\n', '\r']);

        if line == "exit" {
            break;
        }
        if line.trim().is_empty() {
            let _ = stream.write_all(END_SENTINEL);
            continue;
        }

        match parser::parse_line(line) {
            Err(e) => {
                eprintln!("{e}");
                let _ = stream.write_all(END_SENTINEL);
            }
            Ok(commands) => {
                if dispatch(client_id, line, commands, &mut stream, &queue) {
                    break;
                }
            }
        }
    }

    cancel_client(client_id, &queue);
    println!("[{client_id}]<<< client disconnected");
}

/// Runs one parsed request. Returns `true` if this request ended the
/// session (an inline `exit`).
fn dispatch(
    client_id: u64,
    request: &str,
    commands: Vec<Command>,
    stream: &mut TcpStream,
    queue: &Arc<TaskQueue>,
) -> bool {
    if commands.iter().any(|c| c.arguments.is_empty()) {
        // A syntactically valid but empty command (e.g. bare redirection
        // with no program token) — nothing to run.
        let _ = stream.write_all(END_SENTINEL);
        return false;
    }

    if commands.len() == 1 && commands[0].program().starts_with("./") {
        enqueue_managed(client_id, request, &commands[0], stream, queue);
        return false;
    }

    if commands.len() == 1 && builtins::is_builtin(commands[0].program()) {
        let program = commands[0].program().to_string();
        let args = commands[0].arguments[1..].to_vec();
        let outcome = builtins::execute(&program, &args, stream);
        let _ = stream.write_all(END_SENTINEL);
        return matches!(outcome, BuiltinOutcome::EndSession);
    }

    executor::execute_pipeline(&commands, stream);
    let _ = stream.write_all(END_SENTINEL);
    false
}

fn enqueue_managed(
    client_id: u64,
    request: &str,
    command: &Command,
    stream: &TcpStream,
    queue: &Arc<TaskQueue>,
) {
    let sink = match stream.try_clone() {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("shelld: ({client_id}) failed to clone socket: {e}");
            return;
        }
    };

    let task = TaskRecord::new(client_id, sink, request.to_string(), &command.arguments);
    println!("({client_id})--- created ({})", task.burst_time);
    queue.enqueue(task);
}

/// Remove and tear down every queued task belonging to `client_id`.
/// A task currently held by the scheduler (not in the queue) is left
/// alone here — it is reaped naturally at
/// the scheduler's next write attempt once this session's socket is
/// gone.
fn cancel_client(client_id: u64, queue: &TaskQueue) {
    let orphaned = queue.remove_where(|t| t.client_id == client_id);
    for mut task in orphaned {
        if task.has_child() {
            let _ = signals::kill(task.child_pid);
            signals::reap(task.child_pid);
            task.child_pid = 0;
        }
        task.capture_read = None;
    }
}
