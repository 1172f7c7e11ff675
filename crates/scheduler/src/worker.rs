//! Worker threads and the thread-local execution context.

use std::cell::Cell;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::queue::Dequeue;
use crate::runner::Shared;
use crate::task::RunReport;

thread_local! {
    /// Scheduler the current thread works for, if it is a worker.
    static CURRENT_SCHEDULER: Cell<Option<Uuid>> = const { Cell::new(None) };
}

/// Whether the calling thread is a worker of the scheduler identified by `id`.
pub(crate) fn is_worker_of(id: Uuid) -> bool {
    CURRENT_SCHEDULER.with(|current| current.get() == Some(id))
}

/// Installs the execution context for the lifetime of the worker thread.
///
/// Dropping the guard retires the worker: the context is cleared and the
/// live-worker count decremented, also when the thread unwinds.
struct WorkerGuard<'a> {
    shared: &'a Shared,
    index: usize,
}

impl<'a> WorkerGuard<'a> {
    fn enter(shared: &'a Shared, index: usize) -> Self {
        CURRENT_SCHEDULER.with(|current| current.set(Some(shared.id)));
        Self { shared, index }
    }
}

impl Drop for WorkerGuard<'_> {
    fn drop(&mut self) {
        CURRENT_SCHEDULER.with(|current| current.set(None));
        let remaining = self.shared.retire_worker();
        if thread::panicking() {
            warn!(scheduler = %self.shared.id, worker = self.index, "worker unwinding");
        }
        debug!(scheduler = %self.shared.id, worker = self.index, remaining, "worker exited");
    }
}

/// One dedicated execution thread pulling items from the scheduler's queue.
pub(crate) struct Worker {
    index: usize,
    shared: Arc<Shared>,
}

impl Worker {
    /// Spawn the worker's OS thread. The caller has already reserved a
    /// live-worker slot and registered the consumer with the queue.
    pub(crate) fn spawn(shared: Arc<Shared>, index: usize) -> io::Result<JoinHandle<()>> {
        let mut builder =
            thread::Builder::new().name(format!("{}-{}", shared.config.thread_name_prefix, index));
        if let Some(stack_size) = shared.config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let worker = Worker { index, shared };
        builder.spawn(move || worker.run())
    }

    /// Runs until the queue reports closed-and-drained.
    fn run(self) {
        let shared = &*self.shared;
        let _guard = WorkerGuard::enter(shared, self.index);
        debug!(scheduler = %shared.id, worker = self.index, "worker started");

        loop {
            match shared.queue.dequeue() {
                Dequeue::Item(item) => {
                    let task = item.id();
                    let execution = item.run();
                    shared.queue.release();

                    match execution.report {
                        RunReport::Completed(elapsed) => {
                            trace!(scheduler = %shared.id, task, ?elapsed, "task completed");
                        }
                        RunReport::Failed(elapsed) => {
                            warn!(scheduler = %shared.id, task, ?elapsed, "task panicked");
                        }
                        RunReport::Skipped => {
                            trace!(scheduler = %shared.id, task, "task cancelled before start");
                        }
                    }
                    shared.record(execution.report);
                    execution.publish();
                }
                Dequeue::Empty => continue,
                Dequeue::Closed => break,
            }
        }
    }
}
