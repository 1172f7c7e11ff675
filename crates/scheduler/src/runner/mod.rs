//! Scheduler runner -- owns the queue and the elastic worker pool.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, construction, and introspection
//! - `submission`: submit paths and elastic worker growth
//! - `shutdown`: dispose, join, and drop
//! - `tests`: scheduler behaviour tests

mod core;
mod shutdown;
mod submission;

pub use self::core::Scheduler;
pub(crate) use self::core::Shared;
