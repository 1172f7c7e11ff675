use std::mem;
use std::sync::atomic::Ordering;

use tracing::{debug, info, warn};

use crate::task::lock;

use super::Scheduler;

impl Scheduler {
    /// Stop accepting work and let the queued items drain. Idempotent.
    ///
    /// Does not wait for workers to exit: each one retires after observing
    /// the queue closed and empty, so
    /// [`execution_thread_count`](Self::execution_thread_count) reaches zero
    /// once the already-queued items have finished. Use [`join`](Self::join)
    /// to wait for that.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let pending = self.shared.queue.len();
        self.shared.queue.close();
        info!(
            scheduler = %self.shared.id,
            pending,
            live_workers = self.execution_thread_count(),
            "scheduler disposed, draining queue"
        );
    }

    /// Dispose, then block until every worker thread has exited and been reaped.
    ///
    /// Items still queued once no worker is left (only possible when the pool
    /// could not start a worker) resolve as [`TaskError::Abandoned`].
    /// On a worker thread of this scheduler this only disposes, since a
    /// worker cannot wait for itself.
    ///
    /// [`TaskError::Abandoned`]: crate::TaskError::Abandoned
    pub fn join(&self) {
        self.dispose();
        if self.is_execution_thread() {
            warn!(scheduler = %self.shared.id, "join called from a worker thread; not waiting");
            return;
        }

        loop {
            // A submit racing with dispose may still be starting a worker.
            self.shared.wait_for_workers_exit();
            let handles = mem::take(&mut *lock(&self.handles));
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if handle.join().is_err() {
                    warn!(scheduler = %self.shared.id, "worker thread panicked");
                }
            }
        }

        let abandoned = self.shared.abandon_pending();
        if abandoned > 0 {
            warn!(scheduler = %self.shared.id, abandoned, "tasks abandoned with no worker left");
        }
        debug!(scheduler = %self.shared.id, "all workers joined");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.dispose();
    }
}
