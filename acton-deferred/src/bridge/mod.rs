//! Executor bridge: hands tasks to an out-of-band executor.
//!
//! The request context submits a [`TaskEnvelope`] naming the job record; the
//! executor loads the record, runs its payload through a [`JobRunner`], and
//! commits the result. Submission never runs the task on the caller's task.
//!
//! Two executors ship with the crate:
//!
//! - [`LocalExecutor`]: a bounded tokio queue drained by a fixed pool of tasks
//! - `RedisExecutor` (feature `redis`): a Redis list consumed by the
//!   `acton-deferred work` process

mod local;
#[cfg(feature = "redis")]
mod redis;
mod runner;

pub use local::LocalExecutor;
#[cfg(feature = "redis")]
pub use self::redis::{RedisExecutor, RedisQueueConsumer};
pub use runner::{JobRunner, RunReport};

use crate::jobs::{JobId, JobResult, TrackingId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Record type carried by job envelopes.
pub const JOB_RECORD_TYPE: &str = "job";

/// Serializable reference to the work an executor should perform.
///
/// The task itself is resolved from the record on the executor side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    /// Tracking id of this submission.
    pub tracking_id: TrackingId,
    /// Kind of record the envelope refers to.
    pub record_type: String,
    /// Record to run.
    pub job_id: JobId,
}

impl TaskEnvelope {
    /// Envelope for running job `job_id` as submission `tracking_id`.
    #[must_use]
    pub fn new(job_id: JobId, tracking_id: TrackingId) -> Self {
        Self {
            tracking_id,
            record_type: JOB_RECORD_TYPE.to_string(),
            job_id,
        }
    }
}

/// State of one submission as seen by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Waiting or running.
    Pending,
    /// Finished; any result has been committed.
    Done,
    /// The executor could not run the submission.
    Failed,
    /// The executor has no record of the submission.
    Unknown,
}

impl ExecutionStatus {
    /// Get a human-readable status name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the submission is done.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// Submits tasks to an out-of-band executor.
#[async_trait]
pub trait ExecutorBridge: Send + Sync + 'static {
    /// Hand `envelope` to the executor and return immediately.
    ///
    /// Returns the tracking id the submission can be queried under, which is
    /// the envelope's own tracking id.
    ///
    /// # Errors
    ///
    /// Returns an error if the executor does not accept the task.
    async fn submit(&self, envelope: &TaskEnvelope) -> JobResult<TrackingId>;

    /// Ask the executor about a submission directly.
    ///
    /// # Errors
    ///
    /// Returns an error if the executor cannot be reached.
    async fn check_status(&self, tracking_id: &TrackingId) -> JobResult<ExecutionStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_format() {
        let id = JobId::new();
        let envelope = TaskEnvelope::new(id, TrackingId::from("t1"));
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["tracking_id"], "t1");
        assert_eq!(json["record_type"], "job");
        assert_eq!(json["job_id"], id.to_string());

        let parsed: TaskEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn test_execution_status_parse() {
        assert_eq!("done".parse::<ExecutionStatus>().unwrap(), ExecutionStatus::Done);
        assert!("lost".parse::<ExecutionStatus>().is_err());
        assert!(ExecutionStatus::Done.is_done());
        assert!(!ExecutionStatus::Pending.is_done());
    }
}
