use fixpool_core::ConfigError;
use thiserror::Error;

/// Errors returned by [`Scheduler`](crate::Scheduler) construction and submission.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("scheduler is closed")]
    SchedulerClosed,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl From<ConfigError> for SchedulerError {
    fn from(err: ConfigError) -> Self {
        SchedulerError::InvalidConfiguration(err.to_string())
    }
}

/// Failure stored in a work item's completion slot.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task body panicked. Holds the panic message.
    #[error("task failed: {0}")]
    Failed(String),

    #[error("task was cancelled before it started")]
    Cancelled,

    #[error("task was dropped before it could run")]
    Abandoned,

    #[error("task was rejected: {0}")]
    Rejected(#[source] SchedulerError),
}

impl TaskError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }
}
