//! Persistence repositories for job and router records.
//!
//! Request handlers and the executor share job records only through a
//! [`JobStore`]. Every state transition is a targeted, conditional write so
//! that a request never overwrites a result the executor has just committed:
//!
//! - [`JobStore::claim`] moves a record into `queued` atomically
//! - [`JobStore::release`] rolls a failed submission back
//! - [`JobStore::finish`] records a result only for the submission that is
//!   still current
//!
//! Two implementations ship with the crate: [`MemoryStore`] for tests and
//! single-process deployments, and `PgStore` (feature `postgres`).

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

use crate::jobs::{JobId, JobRecord, JobResult, JobStatus, TaskDescriptor, TrackingId};
use crate::router::StoredRouter;
use async_trait::async_trait;
use serde_json::Value;

/// Request to move a job into `queued` for a new submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    /// Tracking id the submission will run under.
    pub tracking_id: TrackingId,
    /// Callback target to store, if the caller set one explicitly.
    pub callback_target: Option<String>,
    /// Whether a finished record may be claimed without a reset.
    pub allow_finished: bool,
    /// Queued submission that may be replaced.
    pub supersede: Option<TrackingId>,
}

impl Claim {
    /// Claim under `tracking_id`, only from `idle`.
    #[must_use]
    pub const fn new(tracking_id: TrackingId) -> Self {
        Self {
            tracking_id,
            callback_target: None,
            allow_finished: false,
            supersede: None,
        }
    }

    /// Store `callback` on the record when the claim succeeds.
    #[must_use]
    pub fn with_callback(mut self, callback: Option<String>) -> Self {
        self.callback_target = callback;
        self
    }

    /// Allow claiming a finished record.
    #[must_use]
    pub const fn with_allow_finished(mut self, allow: bool) -> Self {
        self.allow_finished = allow;
        self
    }

    /// Allow replacing the queued submission tracked as `stale`.
    #[must_use]
    pub fn superseding(mut self, stale: TrackingId) -> Self {
        self.supersede = Some(stale);
        self
    }

    /// Whether this claim may take `record` into `queued`.
    ///
    /// Shared by every store so the decision is identical across backends.
    #[must_use]
    pub fn decide(&self, record: &JobRecord) -> ClaimDecision {
        match record.status {
            JobStatus::Idle => ClaimDecision::Claim,
            JobStatus::Finished if self.allow_finished => ClaimDecision::Claim,
            JobStatus::Finished => ClaimDecision::Finished,
            JobStatus::Queued => match &self.supersede {
                Some(stale) if record.external_job_id.as_ref() == Some(stale) => {
                    ClaimDecision::Claim
                }
                _ => ClaimDecision::AlreadyQueued,
            },
        }
    }

    /// Apply a successful claim to `record`.
    pub fn apply(&self, record: &mut JobRecord) {
        record.mark_queued(self.tracking_id.clone());
        if let Some(callback) = &self.callback_target {
            record.callback_target = Some(callback.clone());
        }
    }
}

/// Pure claim decision for one record state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimDecision {
    /// Take the record into `queued`.
    Claim,
    /// A submission is already in flight.
    AlreadyQueued,
    /// Finished, and the claim does not allow requeueing.
    Finished,
}

/// Result of [`JobStore::claim`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The record moved into `queued`.
    Claimed {
        /// Record as it was before the claim, used to roll back.
        prior: JobRecord,
        /// Record as it is now.
        record: JobRecord,
    },
    /// Nothing changed; a submission is already in flight.
    AlreadyQueued(JobRecord),
    /// Nothing changed; the record is finished.
    Finished(JobRecord),
}

impl ClaimOutcome {
    /// The record as stored after the claim attempt.
    #[must_use]
    pub const fn record(&self) -> &JobRecord {
        match self {
            Self::Claimed { record, .. } | Self::AlreadyQueued(record) | Self::Finished(record) => {
                record
            }
        }
    }
}

/// Repository for job records.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Load a record by id.
    async fn get(&self, id: JobId) -> JobResult<Option<JobRecord>>;

    /// Load a record by its caller-chosen key.
    async fn find_by_key(&self, key: &str) -> JobResult<Option<JobRecord>>;

    /// Load the record stored under `key`, creating an idle one with `payload`
    /// if none exists. The returned record always carries its id.
    async fn get_or_create(&self, key: &str, payload: &TaskDescriptor) -> JobResult<JobRecord>;

    /// Atomically move a record into `queued` if `claim` allows it.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::NotFound`](crate::jobs::JobError::NotFound) if the
    /// record does not exist.
    async fn claim(&self, id: JobId, claim: &Claim) -> JobResult<ClaimOutcome>;

    /// Restore `prior` if the record is still queued under `tracking_id`.
    ///
    /// Returns whether the rollback was applied.
    async fn release(&self, prior: &JobRecord, tracking_id: &TrackingId) -> JobResult<bool>;

    /// Record `result` and flip to `finished` if the record is still queued
    /// under `tracking_id`.
    ///
    /// Returns the committed record, or `None` if the submission is no longer
    /// current and the result was discarded.
    async fn finish(
        &self,
        id: JobId,
        tracking_id: &TrackingId,
        result: Value,
    ) -> JobResult<Option<JobRecord>>;

    /// Return a record to `idle`.
    async fn reset(&self, id: JobId) -> JobResult<JobRecord>;

    /// Replace the stored callback target.
    async fn set_callback(&self, id: JobId, callback: Option<String>) -> JobResult<JobRecord>;

    /// Replace the payload of an idle record.
    ///
    /// Records in any other state are returned unchanged.
    async fn set_payload(&self, id: JobId, payload: &TaskDescriptor) -> JobResult<JobRecord>;
}

/// Repository for router records.
#[async_trait]
pub trait RouterStore: Send + Sync + 'static {
    /// Load the router stored under `key`.
    async fn load(&self, key: &str) -> JobResult<Option<StoredRouter>>;

    /// Insert or replace a router record.
    async fn save(&self, router: &StoredRouter) -> JobResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord::new("job", TaskDescriptor::new("add"))
    }

    #[test]
    fn test_claim_from_idle() {
        let claim = Claim::new(TrackingId::generate());
        assert_eq!(claim.decide(&record()), ClaimDecision::Claim);
    }

    #[test]
    fn test_claim_while_queued_is_noop() {
        let mut record = record();
        record.mark_queued(TrackingId::generate());
        let claim = Claim::new(TrackingId::generate());
        assert_eq!(claim.decide(&record), ClaimDecision::AlreadyQueued);
    }

    #[test]
    fn test_claim_finished_respects_policy() {
        let mut record = record();
        record.mark_queued(TrackingId::generate());
        record.mark_finished(serde_json::json!(1));

        let strict = Claim::new(TrackingId::generate());
        assert_eq!(strict.decide(&record), ClaimDecision::Finished);

        let requeue = strict.with_allow_finished(true);
        assert_eq!(requeue.decide(&record), ClaimDecision::Claim);
    }

    #[test]
    fn test_supersede_only_matching_submission() {
        let stale = TrackingId::generate();
        let mut record = record();
        record.mark_queued(stale.clone());

        let other = Claim::new(TrackingId::generate()).superseding(TrackingId::generate());
        assert_eq!(other.decide(&record), ClaimDecision::AlreadyQueued);

        let matching = Claim::new(TrackingId::generate()).superseding(stale);
        assert_eq!(matching.decide(&record), ClaimDecision::Claim);
    }

    #[test]
    fn test_apply_sets_callback_only_when_given() {
        let mut record = record();
        record.callback_target = Some("/kept".to_string());

        Claim::new(TrackingId::generate()).apply(&mut record);
        assert_eq!(record.callback_target.as_deref(), Some("/kept"));

        record.reset();
        Claim::new(TrackingId::generate())
            .with_callback(Some("/next".to_string()))
            .apply(&mut record);
        assert_eq!(record.callback_target.as_deref(), Some("/next"));
        assert!(record.is_queued());
    }
}
