//! Job runner error types.

use thiserror::Error;

/// Job runner error type.
#[derive(Debug, Error)]
pub enum JobError {
    /// A runner needs at least the calling thread.
    #[error("thread count must be at least 1")]
    InvalidThreadCount,

    /// A job is already executing on this runner (nested or concurrent use).
    #[error("a job is already in flight on runner `{0}`")]
    JobInFlight(String),

    /// More tasks were published than the runner has threads.
    #[error("{tasks} tasks exceed the {threads} threads of the runner")]
    TooManyTasks {
        /// Number of tasks handed to `run`.
        tasks: usize,
        /// Threads available, the caller included.
        threads: usize,
    },

    /// The OS refused to start a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Result type for job runner operations.
pub type JobResult<T> = Result<T, JobError>;
