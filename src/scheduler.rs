//! The single scheduler thread: repeatedly selects a task from the
//! queue and runs it for one quantum, preempting or retiring it.
//!
//! Each managed task is a single `/bin/sh -c` child with no controlling
//! terminal; preemption and resumption happen by sending it STOP/CONT
//! directly, not through a foreground process group.

use os_pipe::pipe;
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::process::{Command as Process, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::queue::TaskQueue;
use crate::signals;
use crate::task::TaskRecord;

/// Run the scheduler loop forever. Intended to be the body of its own
/// dedicated thread; never returns under normal operation.
pub fn run(queue: Arc<TaskQueue>) {
    loop {
        let task = queue.select();
        service(task, &queue);
    }
}

/// Outcome of one tick's worth of forwarding.
enum TickOutcome {
    Forwarded,
    Idle,
    ClientGone,
}

fn service(mut task: TaskRecord, queue: &TaskQueue) {
    if task.has_child() {
        if let Err(e) = signals::cont(task.child_pid) {
            eprintln!("shelld: ({}) failed to resume: {e}", task.client_id);
        }
    } else if let Err(e) = spawn(&mut task) {
        eprintln!("shelld: ({}) failed to start: {e}", task.client_id);
        retire(task);
        return;
    }

    let quantum = task.next_quantum_secs();
    let mut elapsed = 0u32;

    while elapsed < quantum && task.remaining_time > 0 {
        thread::sleep(Duration::from_secs(1));

        match forward_tick(&mut task) {
            TickOutcome::ClientGone => {
                cancel(task);
                return;
            }
            TickOutcome::Forwarded => {
                task.remaining_time = task.remaining_time.saturating_sub(1);
                println!("({})--- running ({})", task.client_id, task.remaining_time);
            }
            TickOutcome::Idle => {
                task.remaining_time = task.remaining_time.saturating_sub(1);
                println!("({})--- waiting ({})", task.client_id, task.remaining_time);
            }
        }

        elapsed += 1;
    }

    if task.remaining_time == 0 {
        retire(task);
    } else {
        preempt(task, queue);
    }
}

fn spawn(task: &mut TaskRecord) -> std::io::Result<()> {
    let (reader, writer) = pipe()?;
    let stderr_writer = writer.try_clone()?;

    let mut process = Process::new("/bin/sh");
    process
        .arg("-c")
        .arg(&task.command_line)
        .stdin(Stdio::null())
        .stdout(Stdio::from(writer))
        .stderr(Stdio::from(stderr_writer));

    let child = process.spawn()?;
    task.child_pid = child.id() as libc::pid_t;
    // We reap this pid ourselves via `signals::reap`/`wait_for_pid`, so
    // the `Child` handle itself is just dropped here rather than waited.
    drop(child);

    signals::set_nonblocking(reader.as_raw_fd())?;
    task.capture_read = Some(reader);

    println!("({})--- started ({})", task.client_id, task.burst_time);
    Ok(())
}

fn forward_tick(task: &mut TaskRecord) -> TickOutcome {
    let Some(reader) = task.capture_read.as_mut() else {
        return TickOutcome::Idle;
    };

    let mut buf = [0u8; 4096];
    let mut any = false;
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                any = true;
                if task.client_sink.write_all(&buf[..n]).is_err() {
                    return TickOutcome::ClientGone;
                }
                task.bytes_sent += n as u64;
                if n < buf.len() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }

    if any {
        TickOutcome::Forwarded
    } else {
        TickOutcome::Idle
    }
}

fn preempt(mut task: TaskRecord, queue: &TaskQueue) {
    if let Err(e) = signals::stop(task.child_pid) {
        eprintln!("shelld: ({}) failed to stop: {e}", task.client_id);
    }
    task.round_count += 1;
    queue.enqueue(task);
}

fn retire(mut task: TaskRecord) {
    drain_remaining(&mut task);

    println!("[{}]<<< {} bytes sent", task.client_id, task.bytes_sent);
    println!("({})--- ended (0)", task.client_id);
    let _ = task.client_sink.write_all(b"__END__");

    task.capture_read = None;
    if task.has_child() {
        signals::reap(task.child_pid);
        task.child_pid = 0;
    }
}

/// A client write failure mid-quantum: kill, reap, drop the record.
/// No `__END__` is sent — the sink that would carry it is the thing
/// that just failed.
fn cancel(mut task: TaskRecord) {
    task.capture_read = None;
    if task.has_child() {
        let _ = signals::kill(task.child_pid);
        signals::reap(task.child_pid);
        task.child_pid = 0;
    }
}

fn drain_remaining(task: &mut TaskRecord) {
    let Some(reader) = task.capture_read.as_mut() else {
        return;
    };
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if task.client_sink.write_all(&buf[..n]).is_err() {
                    break;
                }
                task.bytes_sent += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}
