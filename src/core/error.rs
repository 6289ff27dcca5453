//! Error types for scheduler operations.

use thiserror::Error;

/// Errors produced by the registry, schedulers and task handles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// An active scheduler already uses this name.
    #[error("duplicate scheduler name: {0}")]
    DuplicateName(String),
    /// The scheduler is stopping or stopped and accepts no more work.
    #[error("task rejected: scheduler `{0}` is stopped")]
    Rejected(String),
    /// In-flight work did not drain within the stop timeout.
    #[error("scheduler `{name}` did not stop in time; {abandoned} task(s) abandoned")]
    StopTimeout {
        /// Scheduler name.
        name: String,
        /// Tasks still in flight when the timeout elapsed.
        abandoned: usize,
    },
    /// No worker slot was free and the scheduler does not allow waiting.
    #[error("pool busy: scheduler `{0}` has no free worker")]
    PoolBusy(String),
    /// Configuration or options failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The task panicked while running.
    #[error("task failed: {0}")]
    TaskFailed(String),
    /// The task was cancelled before it ran.
    #[error("task cancelled")]
    Cancelled,
    /// Waiting for a task result timed out.
    #[error("operation timed out")]
    Timeout,
    /// Worker spawn failures, closed channels and similar.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
