//! The task queue: an ordered collection of [`TaskRecord`]s guarded by
//! one mutex and one condition variable, with the RR-before-SJF selection
//! policy.
//!
//! Ordering only needs FIFO arrival order and O(1) push-back/pop-front,
//! so a `VecDeque` stands in for a hand-rolled linked list.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::task::TaskRecord;

pub struct TaskQueue {
    inner: Mutex<VecDeque<TaskRecord>>,
    not_empty: Condvar,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        TaskQueue {
            inner: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
        }
    }

    /// Append at the rear and wake one waiter in `select`.
    pub fn enqueue(&self, task: TaskRecord) {
        let mut guard = self.inner.lock().expect("task queue mutex poisoned");
        guard.push_back(task);
        self.not_empty.notify_one();
    }

    /// Block until the queue is non-empty, then apply the selection
    /// policy and remove the chosen task.
    ///
    /// Policy:
    /// 1. RR-like: the first task (in queue order) with `round_count ==
    ///    0` wins, if any exists.
    /// 2. SJF fallback: otherwise, the task with the smallest
    ///    `remaining_time` wins; ties broken by earliest queue position.
    pub fn select(&self) -> TaskRecord {
        let mut guard = self.inner.lock().expect("task queue mutex poisoned");
        loop {
            if let Some(index) = select_index(&guard) {
                return guard.remove(index).expect("selected index must exist");
            }
            guard = self
                .not_empty
                .wait(guard)
                .expect("task queue mutex poisoned");
        }
    }

    /// Remove and return every task matching `pred`, without signalling
    /// (used for client-disconnect cancellation).
    pub fn remove_where<F>(&self, mut pred: F) -> Vec<TaskRecord>
    where
        F: FnMut(&TaskRecord) -> bool,
    {
        let mut guard = self.inner.lock().expect("task queue mutex poisoned");
        let mut removed = Vec::new();
        let mut remaining = VecDeque::with_capacity(guard.len());
        for task in guard.drain(..) {
            if pred(&task) {
                removed.push(task);
            } else {
                remaining.push_back(task);
            }
        }
        *guard = remaining;
        removed
    }
}

fn select_index(queue: &VecDeque<TaskRecord>) -> Option<usize> {
    if let Some(idx) = queue.iter().position(|t| t.round_count == 0) {
        return Some(idx);
    }

    queue
        .iter()
        .enumerate()
        .min_by_key(|(_, t)| t.remaining_time)
        .map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    fn dummy_sink() -> TcpStream {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let _ = listener.accept().unwrap();
        client
    }

    fn task(client_id: u64, round_count: u32, remaining_time: u32) -> TaskRecord {
        let mut t = TaskRecord::new(
            client_id,
            dummy_sink(),
            "./demo".to_string(),
            &["./demo".to_string()],
        );
        t.round_count = round_count;
        t.remaining_time = remaining_time;
        t
    }

    #[test]
    fn rr_before_sjf_prefers_first_round_tasks() {
        let q = TaskQueue::new();
        q.enqueue(task(1, 1, 2)); // later round, short remaining
        q.enqueue(task(2, 0, 100)); // first round, long remaining
        let selected = q.select();
        assert_eq!(selected.client_id, 2);
    }

    #[test]
    fn sjf_tie_break_is_fifo_arrival() {
        let q = TaskQueue::new();
        q.enqueue(task(1, 1, 5));
        q.enqueue(task(2, 1, 5));
        let selected = q.select();
        assert_eq!(selected.client_id, 1);
    }

    #[test]
    fn sjf_picks_smallest_remaining_time() {
        let q = TaskQueue::new();
        q.enqueue(task(1, 2, 9));
        q.enqueue(task(2, 1, 3));
        q.enqueue(task(3, 3, 6));
        let selected = q.select();
        assert_eq!(selected.client_id, 2);
    }

    #[test]
    fn remove_where_filters_by_client_and_does_not_disturb_others() {
        let q = TaskQueue::new();
        q.enqueue(task(1, 0, 5));
        q.enqueue(task(2, 0, 5));
        q.enqueue(task(1, 0, 5));

        let removed = q.remove_where(|t| t.client_id == 1);
        assert_eq!(removed.len(), 2);

        let remaining = q.select();
        assert_eq!(remaining.client_id, 2);
    }
}
