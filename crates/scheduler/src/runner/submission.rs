use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError};

use tracing::{debug, trace, warn};

use crate::error::{SchedulerError, TaskError};
use crate::task::{CancellationToken, TaskHandle, WorkItem, lock, panic_message};
use crate::worker::Worker;

use super::Scheduler;

impl Scheduler {
    /// Queue `work` and return a handle to its eventual result.
    ///
    /// Spawns at most one additional worker when the queued work is not
    /// covered by an idle worker and the concurrency bound allows it.
    /// Fails with [`SchedulerError::SchedulerClosed`] after [`dispose`](Self::dispose).
    pub fn submit<F, T>(&self, work: F) -> Result<TaskHandle<T>, SchedulerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.submit_cancellable(move |_: &CancellationToken| work())
    }

    /// Like [`submit`](Self::submit), but the body receives the task's
    /// [`CancellationToken`] so it can stop early once cancelled.
    pub fn submit_cancellable<F, T>(&self, work: F) -> Result<TaskHandle<T>, SchedulerError>
    where
        F: FnOnce(&CancellationToken) -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_disposed() {
            return Err(SchedulerError::SchedulerClosed);
        }

        let task = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let (item, handle) = WorkItem::new(task, work);

        // The queue's closed flag is authoritative when racing with dispose.
        let unclaimed = self
            .shared
            .queue
            .enqueue(item)
            .map_err(|_| SchedulerError::SchedulerClosed)?;

        self.shared
            .metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .record_submitted();
        trace!(scheduler = %self.shared.id, task, unclaimed, "task queued");

        if unclaimed > 0 {
            if let Err(e) = self.spawn_worker() {
                if self.execution_thread_count() == 0 {
                    // Nobody will ever run it.
                    handle.cancel();
                    return Err(SchedulerError::Spawn(e));
                }
                warn!(scheduler = %self.shared.id, error = %e, "failed to grow worker pool");
            }
        }

        Ok(handle)
    }

    /// Run `work` inline when called from one of this scheduler's workers,
    /// otherwise submit it and block until it finishes.
    ///
    /// Blocking a worker on a task queued behind it can deadlock a small
    /// pool; running inline avoids that.
    pub fn execute_inline_or_wait<F, T>(&self, work: F) -> Result<T, TaskError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_execution_thread() {
            debug!(scheduler = %self.shared.id, "executing inline on worker thread");
            return panic::catch_unwind(AssertUnwindSafe(work))
                .map_err(|payload| TaskError::Failed(panic_message(payload.as_ref())));
        }
        self.submit(work).map_err(TaskError::Rejected)?.join()
    }

    /// Reserve a live-worker slot and start a worker in it.
    ///
    /// Returns `Ok(false)` when the pool is already at its bound.
    fn spawn_worker(&self) -> io::Result<bool> {
        let shared = &self.shared;
        let mut live = shared.live_workers.load(Ordering::Acquire);
        loop {
            if live >= shared.max_concurrency {
                return Ok(false);
            }
            match shared.live_workers.compare_exchange_weak(
                live,
                live + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => live = actual,
            }
        }

        shared.queue.register_consumer();
        let index = self.next_worker_index.fetch_add(1, Ordering::Relaxed);

        match Worker::spawn(Arc::clone(shared), index) {
            Ok(handle) => {
                lock(&self.handles).push(handle);
                shared
                    .metrics
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .record_worker_spawned(live + 1);
                debug!(
                    scheduler = %shared.id,
                    worker = index,
                    live_workers = live + 1,
                    "worker spawned"
                );
                Ok(true)
            }
            Err(e) => {
                shared.queue.unregister_consumer();
                shared.release_slot();
                Err(e)
            }
        }
    }
}
