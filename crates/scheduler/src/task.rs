//! Work items and the handles callers use to await them.
//!
//! A work item and its [`TaskHandle`] share one completion slot. The item
//! runs at most once; the slot is written exactly once, with the body's value,
//! a captured panic, or a cancellation/abandonment marker.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use crate::error::TaskError;

/// Per-scheduler task identifier, assigned in submission order.
pub type TaskId = u64;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const FINISHED: u8 = 2;
const CANCELLED: u8 = 3;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

// ── Cancellation ─────────────────────────────────────────────────────

/// Cooperative cancellation signal handed to task bodies.
///
/// Raised by [`TaskHandle::cancel`]. A body that has already started keeps
/// running unless it checks [`is_cancelled`](Self::is_cancelled) itself.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    requested: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.requested.store(true, Ordering::Release);
    }
}

// ── Completion slot ──────────────────────────────────────────────────

struct Slot<T> {
    outcome: Option<Result<T, TaskError>>,
    written: bool,
    waker: Option<Waker>,
}

struct Completion<T> {
    state: AtomicU8,
    slot: Mutex<Slot<T>>,
    ready: Condvar,
    token: CancellationToken,
}

impl<T> Completion<T> {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(PENDING),
            slot: Mutex::new(Slot {
                outcome: None,
                written: false,
                waker: None,
            }),
            ready: Condvar::new(),
            token: CancellationToken::default(),
        }
    }

    /// Claim the one-shot right to run. Fails if already run or cancelled.
    fn try_start(&self) -> bool {
        self.state
            .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn try_transition(&self, to: u8) -> bool {
        self.state
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn write(&self, outcome: Result<T, TaskError>) {
        let waker = {
            let mut slot = lock(&self.slot);
            if slot.written {
                return;
            }
            slot.outcome = Some(outcome);
            slot.written = true;
            slot.waker.take()
        };
        self.ready.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    fn is_written(&self) -> bool {
        lock(&self.slot).written
    }
}

// ── Runnable plumbing ────────────────────────────────────────────────

/// What happened when a worker picked up an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunReport {
    Completed(Duration),
    Failed(Duration),
    /// Cancelled before it started; the body never ran.
    Skipped,
}

/// Result of running an item, not yet visible to the awaiting caller.
///
/// Workers publish only after marking themselves idle again, so a caller
/// that observes completion and submits more work finds the worker free.
pub(crate) struct Execution {
    pub(crate) report: RunReport,
    publish: Option<Box<dyn FnOnce() + Send>>,
}

impl Execution {
    pub(crate) fn publish(mut self) {
        if let Some(publish) = self.publish.take() {
            publish();
        }
    }
}

trait Runnable: Send {
    fn run(self: Box<Self>) -> Execution;

    /// Resolve as abandoned without running. `false` if it already resolved.
    fn abandon(self: Box<Self>) -> bool;
}

struct Job<F, T> {
    body: Option<F>,
    completion: Arc<Completion<T>>,
}

impl<F, T> Runnable for Job<F, T>
where
    F: FnOnce(&CancellationToken) -> T + Send + 'static,
    T: Send + 'static,
{
    fn run(mut self: Box<Self>) -> Execution {
        let body = match self.body.take() {
            Some(body) if self.completion.try_start() => body,
            _ => {
                return Execution {
                    report: RunReport::Skipped,
                    publish: None,
                };
            }
        };

        let token = self.completion.token.clone();
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&token)));
        let elapsed = started.elapsed();

        let (report, outcome) = match outcome {
            Ok(value) => (RunReport::Completed(elapsed), Ok(value)),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                (RunReport::Failed(elapsed), Err(TaskError::Failed(message)))
            }
        };

        let completion = Arc::clone(&self.completion);
        Execution {
            report,
            publish: Some(Box::new(move || {
                completion.state.store(FINISHED, Ordering::Release);
                completion.write(outcome);
            })),
        }
    }

    fn abandon(mut self: Box<Self>) -> bool {
        self.body.take();
        if self.completion.try_transition(FINISHED) {
            self.completion.write(Err(TaskError::Abandoned));
            true
        } else {
            false
        }
    }
}

impl<F, T> Drop for Job<F, T> {
    fn drop(&mut self) {
        // Never claimed by a worker: resolve the handle so no waiter hangs.
        if self.body.is_some() && self.completion.try_transition(FINISHED) {
            self.completion.write(Err(TaskError::Abandoned));
        }
    }
}

// ── WorkItem ─────────────────────────────────────────────────────────

/// A submitted unit of work, owned by the queue until a worker claims it.
pub(crate) struct WorkItem {
    id: TaskId,
    job: Box<dyn Runnable>,
}

impl WorkItem {
    /// Wrap `body` as a work item paired with the handle that awaits it.
    pub(crate) fn new<F, T>(id: TaskId, body: F) -> (WorkItem, TaskHandle<T>)
    where
        F: FnOnce(&CancellationToken) -> T + Send + 'static,
        T: Send + 'static,
    {
        let completion = Arc::new(Completion::new());
        let job = Job {
            body: Some(body),
            completion: Arc::clone(&completion),
        };
        let item = WorkItem {
            id,
            job: Box::new(job),
        };
        (item, TaskHandle { id, completion })
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn run(self) -> Execution {
        self.job.run()
    }

    /// Drop the item unrun, resolving its handle with [`TaskError::Abandoned`].
    ///
    /// Returns `false` when the handle was already resolved (cancelled).
    pub(crate) fn abandon(self) -> bool {
        self.job.abandon()
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem").field("id", &self.id).finish()
    }
}

// ── TaskHandle ───────────────────────────────────────────────────────

/// Handle to the eventual result of a submitted task.
///
/// Wait synchronously with [`join`](Self::join) or `.await` it; waiting
/// does not occupy a worker.
pub struct TaskHandle<T> {
    id: TaskId,
    completion: Arc<Completion<T>>,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Whether the completion slot has been written.
    pub fn is_finished(&self) -> bool {
        self.completion.is_written()
    }

    /// Request cancellation.
    ///
    /// Returns `true` if the task had not started and will never run; the
    /// handle then resolves to [`TaskError::Cancelled`]. Otherwise only the
    /// task's [`CancellationToken`] is raised.
    pub fn cancel(&self) -> bool {
        self.completion.token.cancel();
        if self.completion.try_transition(CANCELLED) {
            self.completion.write(Err(TaskError::Cancelled));
            true
        } else {
            false
        }
    }

    /// Block up to `timeout` for completion. Returns `true` once finished.
    ///
    /// A timeout too large to represent as a deadline waits indefinitely.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut slot = lock(&self.completion.slot);
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            while !slot.written {
                slot = self
                    .completion
                    .ready
                    .wait(slot)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            return true;
        };
        while !slot.written {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            slot = self
                .completion
                .ready
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Block until the task finishes and take its outcome.
    ///
    /// # Panics
    ///
    /// If the outcome was already taken by awaiting the handle by reference.
    pub fn join(self) -> Result<T, TaskError> {
        let mut slot = lock(&self.completion.slot);
        loop {
            if let Some(outcome) = slot.outcome.take() {
                return outcome;
            }
            assert!(!slot.written, "TaskHandle joined after its outcome was taken");
            slot = self
                .completion
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = lock(&self.completion.slot);
        if let Some(outcome) = slot.outcome.take() {
            return Poll::Ready(outcome);
        }
        assert!(!slot.written, "TaskHandle polled after completion");
        slot.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}
