//! [`TaskRecord`]: one client-submitted managed program under scheduler
//! control.

use os_pipe::PipeReader;
use std::net::TcpStream;

/// A managed task, owned by exactly one of {the session that created it,
/// the task queue, the scheduler loop} at any instant.
pub struct TaskRecord {
    pub client_id: u64,
    pub client_sink: TcpStream,
    pub command_line: String,

    pub burst_time: u32,
    pub remaining_time: u32,
    pub round_count: u32,

    /// 0 means "not yet started." Set at SPAWN, cleared at RETIRE.
    pub child_pid: libc::pid_t,
    /// Read end of the pipe carrying the child's merged stdout+stderr.
    /// `None` until SPAWN creates it, taken back to `None` at RETIRE.
    pub capture_read: Option<PipeReader>,
    pub bytes_sent: u64,
}

impl TaskRecord {
    /// Derive `burst_time` from the managed program's first positional
    /// argument: numeric and positive → that value; anything else → 1.
    /// A long-standing quirk of this system rather than an obvious
    /// design choice, but callers rely on it.
    pub fn new(client_id: u64, client_sink: TcpStream, command_line: String, arguments: &[String]) -> Self {
        let burst_time = arguments
            .get(1)
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(1);

        TaskRecord {
            client_id,
            client_sink,
            command_line,
            burst_time,
            remaining_time: burst_time,
            round_count: 0,
            child_pid: 0,
            capture_read: None,
            bytes_sent: 0,
        }
    }

    /// Quantum length for the *next* round this task receives: 3s for the
    /// first round, 7s for every round after.
    pub fn next_quantum_secs(&self) -> u32 {
        if self.round_count == 0 { 3 } else { 7 }
    }

    pub fn has_child(&self) -> bool {
        self.child_pid != 0
    }
}
