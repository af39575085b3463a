//! Durable state for one unit of deferred work.

use super::TaskDescriptor;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Create a new random job ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<JobId> for Uuid {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identifier handed out by the executor queue for one submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingId(String);

impl TrackingId {
    /// Generate a fresh tracking id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Borrow the id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TrackingId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TrackingId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a job record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Never started, or explicitly reset.
    #[default]
    Idle,

    /// Submitted to the executor and not yet finished.
    Queued,

    /// The executor recorded a result.
    Finished,
}

impl JobStatus {
    /// Get a human-readable status name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Queued => "queued",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "queued" => Ok(Self::Queued),
            "finished" => Ok(Self::Finished),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Durable state for one unit of deferred work.
///
/// Records are created on first registration and never deleted automatically.
/// All transitions go through the methods below so that `result` is only ever
/// present while the status is [`JobStatus::Finished`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Record identifier.
    pub id: JobId,
    /// Caller-chosen name used for create-or-get lookups.
    pub key: String,
    /// Lifecycle state.
    pub status: JobStatus,
    /// Task to run.
    pub payload: TaskDescriptor,
    /// Last computed output.
    pub result: Option<Value>,
    /// Where to resume after completion.
    pub callback_target: Option<String>,
    /// Tracking id of the current submission.
    pub external_job_id: Option<TrackingId>,
    /// When the record last entered `queued`.
    pub queued_at: Option<DateTime<Utc>>,
    /// When the record last entered `finished`.
    pub finished_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Create an idle record.
    #[must_use]
    pub fn new(key: impl Into<String>, payload: TaskDescriptor) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            key: key.into(),
            status: JobStatus::Idle,
            payload,
            result: None,
            callback_target: None,
            external_job_id: None,
            queued_at: None,
            finished_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the executor has recorded a result.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self.status, JobStatus::Finished)
    }

    /// Whether the record is waiting on the executor.
    #[must_use]
    pub const fn is_queued(&self) -> bool {
        matches!(self.status, JobStatus::Queued)
    }

    /// Whether the record is idle.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self.status, JobStatus::Idle)
    }

    /// Transition into `queued` for the submission identified by `tracking_id`.
    ///
    /// Any previous result is dropped.
    pub fn mark_queued(&mut self, tracking_id: TrackingId) {
        let now = Utc::now();
        self.status = JobStatus::Queued;
        self.result = None;
        self.external_job_id = Some(tracking_id);
        self.queued_at = Some(now);
        self.finished_at = None;
        self.updated_at = now;
    }

    /// Record the executor's output and flip to `finished` in one step.
    pub fn mark_finished(&mut self, result: Value) {
        let now = Utc::now();
        self.status = JobStatus::Finished;
        self.result = Some(result);
        self.finished_at = Some(now);
        self.updated_at = now;
    }

    /// Return to `idle`, clearing the result and tracking id.
    ///
    /// The callback target and payload are kept.
    pub fn reset(&mut self) {
        self.status = JobStatus::Idle;
        self.result = None;
        self.external_job_id = None;
        self.queued_at = None;
        self.finished_at = None;
        self.updated_at = Utc::now();
    }

    /// Whether this record has been queued for longer than `expiry`.
    #[must_use]
    pub fn queued_longer_than(&self, expiry: Duration, now: DateTime<Utc>) -> bool {
        self.is_queued() && self.queued_at.is_some_and(|at| now - at > expiry)
    }

    /// Whether this record is queued under the given tracking id.
    #[must_use]
    pub fn is_queued_as(&self, tracking_id: &TrackingId) -> bool {
        self.is_queued() && self.external_job_id.as_ref() == Some(tracking_id)
    }
}
