//! Bounded-concurrency task scheduler.
//!
//! A [`Scheduler`] accepts closures from any thread and runs them on a
//! lazily grown pool of at most `max_concurrency` dedicated worker threads.
//! Each submission yields a [`TaskHandle`] that can be joined or awaited;
//! a panicking body only fails its own handle.
//!
//! ```no_run
//! use fixpool_scheduler::Scheduler;
//!
//! let scheduler = Scheduler::new(2)?;
//! let handle = scheduler.submit(|| 6 * 7)?;
//! assert_eq!(handle.join()?, 42);
//!
//! scheduler.dispose();
//! assert!(scheduler.submit(|| ()).is_err());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod metrics;
pub mod runner;
pub mod task;
mod queue;
mod worker;

pub use error::{SchedulerError, TaskError};
pub use metrics::SchedulerMetrics;
pub use runner::Scheduler;
pub use task::{CancellationToken, TaskHandle, TaskId};

pub use fixpool_core::SchedulerConfig;
