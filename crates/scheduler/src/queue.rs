//! FIFO hand-off between submitting threads and workers.
//!
//! Besides the pending items the queue tracks how many registered consumers
//! are idle (not holding an item). [`WorkQueue::enqueue`] reports how much
//! queued work no idle consumer can cover, which is the scheduler's signal
//! to grow the pool.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, PoisonError};

use thiserror::Error;

use crate::task::{WorkItem, lock};

#[derive(Debug, Error)]
#[error("work queue is closed")]
pub(crate) struct QueueClosed;

/// Outcome of a dequeue attempt.
#[derive(Debug)]
pub(crate) enum Dequeue {
    Item(WorkItem),
    /// Nothing queued right now (non-blocking attempts only).
    Empty,
    /// Closed and fully drained; the consumer should exit.
    Closed,
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<WorkItem>,
    closed: bool,
    /// Registered consumers not currently holding an item.
    idle: usize,
}

#[derive(Debug, Default)]
pub(crate) struct WorkQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item and wake one parked consumer.
    ///
    /// Returns the number of queued items not covered by an idle consumer.
    pub fn enqueue(&self, item: WorkItem) -> Result<usize, QueueClosed> {
        let unclaimed = {
            let mut state = lock(&self.state);
            if state.closed {
                return Err(QueueClosed);
            }
            state.items.push_back(item);
            state.items.len().saturating_sub(state.idle)
        };
        self.available.notify_one();
        Ok(unclaimed)
    }

    /// Block until an item is available or the queue is closed and drained.
    ///
    /// Must be called by a registered consumer. Taking an item marks the
    /// consumer busy until [`release`](Self::release); observing
    /// [`Dequeue::Closed`] unregisters it.
    pub fn dequeue(&self) -> Dequeue {
        let mut state = lock(&self.state);
        loop {
            if let Some(item) = state.items.pop_front() {
                state.idle = state.idle.saturating_sub(1);
                return Dequeue::Item(item);
            }
            if state.closed {
                state.idle = state.idle.saturating_sub(1);
                return Dequeue::Closed;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Non-blocking [`dequeue`](Self::dequeue): yields [`Dequeue::Empty`] instead of parking.
    pub fn try_dequeue(&self) -> Dequeue {
        let mut state = lock(&self.state);
        if let Some(item) = state.items.pop_front() {
            state.idle = state.idle.saturating_sub(1);
            Dequeue::Item(item)
        } else if state.closed {
            state.idle = state.idle.saturating_sub(1);
            Dequeue::Closed
        } else {
            Dequeue::Empty
        }
    }

    /// Mark a consumer idle again after it finished an item.
    pub fn release(&self) {
        lock(&self.state).idle += 1;
    }

    /// Count a new consumer as idle before its thread starts dequeuing.
    pub fn register_consumer(&self) {
        lock(&self.state).idle += 1;
    }

    /// Undo [`register_consumer`](Self::register_consumer) for a consumer that never started.
    pub fn unregister_consumer(&self) {
        let mut state = lock(&self.state);
        state.idle = state.idle.saturating_sub(1);
    }

    /// Stop accepting items and wake every parked consumer. Idempotent.
    ///
    /// Returns `true` for the call that actually closed the queue.
    pub fn close(&self) -> bool {
        let newly_closed = {
            let mut state = lock(&self.state);
            !std::mem::replace(&mut state.closed, true)
        };
        self.available.notify_all();
        newly_closed
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    pub fn len(&self) -> usize {
        lock(&self.state).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn idle_consumers(&self) -> usize {
        lock(&self.state).idle
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::task::{CancellationToken, TaskHandle};

    fn item(id: u64) -> (WorkItem, TaskHandle<u64>) {
        WorkItem::new(id, move |_: &CancellationToken| id)
    }

    fn expect_item(d: Dequeue) -> WorkItem {
        match d {
            Dequeue::Item(item) => item,
            other => panic!("expected item, got {other:?}"),
        }
    }

    #[test]
    fn fifo_order() {
        let queue = WorkQueue::new();
        let mut handles = Vec::new();
        for id in 0..5 {
            let (it, handle) = item(id);
            queue.enqueue(it).unwrap();
            handles.push(handle);
        }
        assert_eq!(queue.len(), 5);

        queue.register_consumer();
        let ids: Vec<u64> = (0..5).map(|_| expect_item(queue.try_dequeue()).id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn try_dequeue_on_open_empty_queue_is_empty() {
        let queue = WorkQueue::new();
        assert!(matches!(queue.try_dequeue(), Dequeue::Empty));
    }

    #[test]
    fn enqueue_after_close_fails() {
        let queue = WorkQueue::new();
        assert!(queue.close());
        assert!(!queue.close(), "second close is a no-op");
        assert!(queue.is_closed());

        let (it, handle) = item(1);
        assert!(queue.enqueue(it).is_err());
        // The rejected item was dropped unexecuted.
        assert!(matches!(handle.join(), Err(crate::TaskError::Abandoned)));
    }

    #[test]
    fn closed_queue_drains_before_reporting_closed() {
        let queue = WorkQueue::new();
        let (a, _ha) = item(1);
        let (b, _hb) = item(2);
        queue.enqueue(a).unwrap();
        queue.enqueue(b).unwrap();
        queue.close();

        queue.register_consumer();
        assert_eq!(expect_item(queue.dequeue()).id(), 1);
        queue.release();
        assert_eq!(expect_item(queue.dequeue()).id(), 2);
        queue.release();
        assert!(matches!(queue.dequeue(), Dequeue::Closed));
        assert_eq!(queue.idle_consumers(), 0);
    }

    #[test]
    fn unclaimed_count_accounts_for_idle_consumers() {
        let queue = WorkQueue::new();
        let (a, _ha) = item(1);
        assert_eq!(queue.enqueue(a).unwrap(), 1, "no consumers at all");

        queue.register_consumer();
        let (b, _hb) = item(2);
        assert_eq!(queue.enqueue(b).unwrap(), 1, "two items, one idle consumer");

        queue.register_consumer();
        let (c, _hc) = item(3);
        assert_eq!(queue.enqueue(c).unwrap(), 1);

        let _taken = expect_item(queue.try_dequeue());
        assert_eq!(queue.idle_consumers(), 1);
        queue.release();
        assert_eq!(queue.idle_consumers(), 2);

        queue.unregister_consumer();
        assert_eq!(queue.idle_consumers(), 1);
    }

    #[test]
    fn blocked_consumer_wakes_on_enqueue() {
        let queue = Arc::new(WorkQueue::new());
        queue.register_consumer();

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || expect_item(queue.dequeue()).id())
        };

        thread::sleep(Duration::from_millis(30));
        let (it, _handle) = item(42);
        assert_eq!(queue.enqueue(it).unwrap(), 0, "parked consumer covers the item");
        assert_eq!(consumer.join().unwrap(), 42);
    }

    #[test]
    fn close_wakes_all_parked_consumers() {
        let queue = Arc::new(WorkQueue::new());
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                queue.register_consumer();
                let queue = Arc::clone(&queue);
                thread::spawn(move || matches!(queue.dequeue(), Dequeue::Closed))
            })
            .collect();

        thread::sleep(Duration::from_millis(30));
        queue.close();

        for consumer in consumers {
            assert!(consumer.join().unwrap());
        }
        assert_eq!(queue.idle_consumers(), 0);
    }
}
