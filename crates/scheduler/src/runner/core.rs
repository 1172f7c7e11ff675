use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;

use fixpool_core::SchedulerConfig;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::metrics::SchedulerMetrics;
use crate::queue::{Dequeue, WorkQueue};
use crate::task::{RunReport, lock};
use crate::worker;

/// State shared between the scheduler and its worker threads.
pub(crate) struct Shared {
    /// Identity used by workers to answer `is_execution_thread`.
    pub(crate) id: Uuid,
    pub(crate) config: SchedulerConfig,
    /// Resolved upper bound on live workers.
    pub(crate) max_concurrency: usize,
    pub(crate) queue: WorkQueue,
    /// Workers spawned (or reserved for spawning) and not yet exited.
    pub(crate) live_workers: AtomicUsize,
    /// Signalled whenever a live-worker slot is given back.
    exit_lock: Mutex<()>,
    exited: Condvar,
    pub(crate) metrics: RwLock<SchedulerMetrics>,
}

impl Shared {
    /// Record what a worker did with one item.
    pub(crate) fn record(&self, report: RunReport) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        match report {
            RunReport::Completed(elapsed) => metrics.record_execution(elapsed, false),
            RunReport::Failed(elapsed) => metrics.record_execution(elapsed, true),
            RunReport::Skipped => metrics.record_cancelled(),
        }
    }

    /// Called by an exiting worker. Returns the remaining live-worker count.
    pub(crate) fn retire_worker(&self) -> usize {
        self.metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .record_worker_retired();
        self.release_slot()
    }

    /// Give back a live-worker slot and wake anyone waiting for the pool to empty.
    pub(crate) fn release_slot(&self) -> usize {
        let remaining = self.live_workers.fetch_sub(1, Ordering::AcqRel) - 1;
        // Waiters check the count while holding `exit_lock`.
        let _guard = lock(&self.exit_lock);
        self.exited.notify_all();
        remaining
    }

    /// Block until no worker is live or reserved.
    pub(crate) fn wait_for_workers_exit(&self) {
        let mut guard = lock(&self.exit_lock);
        while self.live_workers.load(Ordering::Acquire) > 0 {
            guard = self
                .exited
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Resolve every item still queued after the pool emptied.
    ///
    /// Items already cancelled are counted as cancelled, the rest as abandoned.
    pub(crate) fn abandon_pending(&self) -> usize {
        if self.queue.is_empty() {
            return 0;
        }
        let mut abandoned = 0;
        while let Dequeue::Item(item) = self.queue.try_dequeue() {
            let task = item.id();
            // Resolve outside the metrics lock; resolving may wake an awaiting task.
            let was_pending = item.abandon();
            let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
            if was_pending {
                metrics.record_abandoned();
                abandoned += 1;
                debug!(scheduler = %self.id, task, "task abandoned");
            } else {
                metrics.record_cancelled();
            }
        }
        abandoned
    }
}

/// A bounded-concurrency task scheduler.
///
/// Tasks submitted from any thread run on at most `max_concurrency`
/// dedicated worker threads. Workers are spawned lazily when queued work
/// is not covered by an idle worker, and persist until the scheduler is
/// disposed. Dropping the scheduler disposes it.
pub struct Scheduler {
    pub(super) shared: Arc<Shared>,
    pub(super) disposed: AtomicBool,
    pub(super) next_task_id: AtomicU64,
    pub(super) next_worker_index: AtomicUsize,
    /// Join handles of every worker spawned so far.
    pub(super) handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create a scheduler running at most `max_concurrency` workers.
    ///
    /// Fails with [`SchedulerError::InvalidConfiguration`] when `max_concurrency` is 0.
    pub fn new(max_concurrency: usize) -> Result<Self, SchedulerError> {
        if max_concurrency == 0 {
            return Err(SchedulerError::InvalidConfiguration(
                "max_concurrency must be at least 1".into(),
            ));
        }
        Self::with_config(SchedulerConfig::with_max_concurrency(max_concurrency))
    }

    /// Create a scheduler from a full config. `max_concurrency = 0` resolves
    /// to the available parallelism.
    pub fn with_config(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;
        let max_concurrency = config.resolved_max_concurrency();
        let id = Uuid::new_v4();

        info!(
            scheduler = %id,
            max_concurrency,
            thread_name_prefix = %config.thread_name_prefix,
            "scheduler created"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                id,
                config,
                max_concurrency,
                queue: WorkQueue::new(),
                live_workers: AtomicUsize::new(0),
                exit_lock: Mutex::new(()),
                exited: Condvar::new(),
                metrics: RwLock::new(SchedulerMetrics::default()),
            }),
            disposed: AtomicBool::new(false),
            next_task_id: AtomicU64::new(0),
            next_worker_index: AtomicUsize::new(0),
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Unique identity of this scheduler instance.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Number of live worker threads.
    ///
    /// Never exceeds [`maximum_concurrency_level`](Self::maximum_concurrency_level).
    pub fn execution_thread_count(&self) -> usize {
        self.shared.live_workers.load(Ordering::Acquire)
    }

    /// The fixed concurrency bound.
    pub fn maximum_concurrency_level(&self) -> usize {
        self.shared.max_concurrency
    }

    /// True exactly when called from one of this scheduler's workers.
    ///
    /// Use it to avoid blocking a worker on a task it submitted itself
    /// (see [`execute_inline_or_wait`](Self::execute_inline_or_wait)).
    pub fn is_execution_thread(&self) -> bool {
        worker::is_worker_of(self.shared.id)
    }

    /// Queued items not yet claimed by a worker.
    pub fn pending_count(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Get a snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        self.shared
            .metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("id", &self.shared.id)
            .field("max_concurrency", &self.shared.max_concurrency)
            .field("live_workers", &self.execution_thread_count())
            .field("idle_workers", &self.shared.queue.idle_consumers())
            .field("pending", &self.pending_count())
            .field("disposed", &self.is_disposed())
            .field("queue_closed", &self.shared.queue.is_closed())
            .finish()
    }
}
