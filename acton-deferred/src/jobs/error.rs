//! Job-related error types.

use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Errors that can occur while registering, submitting, or executing jobs.
#[derive(Debug, Error)]
pub enum JobError {
    /// Task execution failed.
    #[error("job execution failed: {0}")]
    ExecutionFailed(String),

    /// The executor queue rejected or could not accept the task.
    ///
    /// The job is left in the state it had before the enqueue attempt.
    #[error("task submission failed: {0}")]
    SubmissionFailed(String),

    /// The executor rejected the task and the claim could not be undone.
    ///
    /// The record stays `queued` under a tracking id the executor never
    /// received; a reset or the queued-job expiry recovers it.
    #[error("task submission failed: {submission}; rollback failed: {rollback}")]
    RollbackFailed {
        /// Why the executor rejected the task.
        submission: String,
        /// Why the store could not restore the prior record.
        rollback: String,
    },

    /// No task is registered under this name.
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// Task arguments are missing or have the wrong type.
    #[error("invalid task arguments: {0}")]
    InvalidArguments(String),

    /// Job record not found.
    #[error("job not found: {0}")]
    NotFound(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Redis error.
    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// Redis connection pool error.
    #[cfg(feature = "redis")]
    #[error("redis pool error: {0}")]
    RedisPool(#[from] deadpool_redis::PoolError),

    /// Notification could not be published.
    #[error("notification failed: {0}")]
    Notify(String),

    /// Placeholder template failed to render.
    #[error("template error: {0}")]
    Template(#[from] askama::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl JobError {
    /// Wrap any error as a submission failure, keeping submission failures as they are.
    #[must_use]
    pub fn into_submission_failure(self) -> Self {
        match self {
            Self::SubmissionFailed(_) => self,
            other => Self::SubmissionFailed(other.to_string()),
        }
    }
}

impl From<String> for JobError {
    fn from(s: String) -> Self {
        Self::ExecutionFailed(s)
    }
}

impl From<&str> for JobError {
    fn from(s: &str) -> Self {
        Self::ExecutionFailed(s.to_string())
    }
}

impl From<anyhow::Error> for JobError {
    fn from(err: anyhow::Error) -> Self {
        Self::ExecutionFailed(err.to_string())
    }
}
