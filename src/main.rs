mod builtins;
mod executor;
mod parser;
mod queue;
mod scheduler;
mod session;
mod signals;
mod status;
mod task;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

const BIND_ADDR: &str = "0.0.0.0:8080";
const LISTEN_BACKLOG: i32 = 5;

fn main() {
    let addr = BIND_ADDR.parse().expect("BIND_ADDR must be a valid socket address");
    let listener = signals::bind_with_backlog(addr, LISTEN_BACKLOG)
        .unwrap_or_else(|e| panic!("shelld: failed to bind {BIND_ADDR}: {e}"));

    let task_queue = Arc::new(queue::TaskQueue::new());
    let next_client_id = Arc::new(AtomicU64::new(1));

    let scheduler_queue = Arc::clone(&task_queue);
    thread::spawn(move || scheduler::run(scheduler_queue));

    for incoming in listener.incoming() {
        let stream = match incoming {
            Ok(stream) => stream,
            Err(e) => {
                eprintln!("shelld: accept failed: {e}");
                continue;
            }
        };

        let client_id = next_client_id.fetch_add(1, Ordering::Relaxed);
        let session_queue = Arc::clone(&task_queue);
        thread::spawn(move || session::handle(client_id, stream, session_queue));
    }
}
