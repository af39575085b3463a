//! The Worker: one job record's lifecycle, seen from the request context.
//!
//! ```text
//! idle --enqueue--> queued --executor finishes--> finished --reset--> idle
//!                   queued --enqueue--> queued            (no-op)
//!                   finished --enqueue--> queued          (AutoRequeue only)
//! ```
//!
//! A [`WorkerManager`] is the host's handle on the shared store and executor
//! bridge. It hands out [`Worker`]s by key; a worker never runs its task on
//! the caller's task.

use super::{
    JobError, JobId, JobRecord, JobResult, Placeholder, PlaceholderSettings, TaskDescriptor,
    TrackingId,
};
use crate::bridge::{ExecutionStatus, ExecutorBridge, TaskEnvelope};
use crate::resolution::{Resolution, TerminalPolicy};
use crate::store::{Claim, ClaimOutcome, JobStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What `enqueue` does with a finished job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishedPolicy {
    /// A finished job stays finished until explicitly reset.
    #[default]
    RequireReset,
    /// Enqueueing a finished job starts a new run.
    AutoRequeue,
}

impl FinishedPolicy {
    /// Whether a finished job may be claimed again.
    #[must_use]
    pub const fn allows_requeue(self) -> bool {
        matches!(self, Self::AutoRequeue)
    }
}

/// Worker behavior shared by every job a manager hands out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// What `enqueue` does with a finished job.
    pub finished_policy: FinishedPolicy,
    /// Resubmit jobs queued longer than this many seconds whose submission is
    /// no longer pending. `None` disables the check.
    pub queued_expiry_secs: Option<u64>,
}

impl WorkerSettings {
    /// Set the finished policy.
    #[must_use]
    pub const fn with_finished_policy(mut self, policy: FinishedPolicy) -> Self {
        self.finished_policy = policy;
        self
    }

    /// Enable the queued-job expiry check.
    #[must_use]
    pub const fn with_queued_expiry(mut self, expiry: Duration) -> Self {
        self.queued_expiry_secs = Some(expiry.as_secs());
        self
    }

    fn queued_expiry(&self) -> Option<chrono::Duration> {
        self.queued_expiry_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .map(chrono::Duration::seconds)
    }
}

/// Host handle on the job store and executor bridge.
#[derive(Clone)]
pub struct WorkerManager {
    store: Arc<dyn JobStore>,
    bridge: Arc<dyn ExecutorBridge>,
    settings: WorkerSettings,
    placeholder: PlaceholderSettings,
}

impl WorkerManager {
    /// Create a manager with default settings.
    pub fn new(store: Arc<dyn JobStore>, bridge: Arc<dyn ExecutorBridge>) -> Self {
        Self {
            store,
            bridge,
            settings: WorkerSettings::default(),
            placeholder: PlaceholderSettings::default(),
        }
    }

    /// Replace the worker settings.
    #[must_use]
    pub fn with_settings(mut self, settings: WorkerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the placeholder settings.
    #[must_use]
    pub fn with_placeholder(mut self, placeholder: PlaceholderSettings) -> Self {
        self.placeholder = placeholder;
        self
    }

    /// Create a manager configured from `config`.
    pub fn from_config(
        config: &crate::config::DeferredConfig,
        store: Arc<dyn JobStore>,
        bridge: Arc<dyn ExecutorBridge>,
    ) -> Self {
        Self::new(store, bridge)
            .with_settings(config.worker.clone())
            .with_placeholder(config.placeholder.clone())
    }

    /// Shared job store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Executor bridge.
    #[must_use]
    pub fn bridge(&self) -> &Arc<dyn ExecutorBridge> {
        &self.bridge
    }

    /// Worker settings.
    #[must_use]
    pub const fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// Placeholder settings.
    #[must_use]
    pub const fn placeholder_settings(&self) -> &PlaceholderSettings {
        &self.placeholder
    }

    /// Get the worker stored under `key`, creating an idle one running
    /// `payload` if none exists.
    ///
    /// An existing record keeps its stored payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn worker(&self, key: &str, payload: TaskDescriptor) -> JobResult<Worker> {
        let record = self.store.get_or_create(key, &payload).await?;
        Ok(self.attach(record))
    }

    /// Get the worker for an existing record.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::NotFound`] if no such record exists.
    pub async fn worker_by_id(&self, id: JobId) -> JobResult<Worker> {
        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        Ok(self.attach(record))
    }

    /// Get the worker stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn find_worker(&self, key: &str) -> JobResult<Option<Worker>> {
        Ok(self
            .store
            .find_by_key(key)
            .await?
            .map(|record| self.attach(record)))
    }

    /// Ask the executor directly whether a submission is done.
    ///
    /// # Errors
    ///
    /// Returns an error if the executor cannot be queried.
    pub async fn check_status(&self, tracking_id: &TrackingId) -> JobResult<ExecutionStatus> {
        self.bridge.check_status(tracking_id).await
    }

    pub(crate) fn attach(&self, record: JobRecord) -> Worker {
        Worker {
            manager: self.clone(),
            record,
            placeholder: None,
        }
    }
}

impl fmt::Debug for WorkerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerManager")
            .field("settings", &self.settings)
            .field("placeholder", &self.placeholder)
            .finish_non_exhaustive()
    }
}

/// Result of [`Worker::enqueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The task was submitted under this tracking id.
    Submitted(TrackingId),
    /// A submission was already in flight; nothing was submitted.
    AlreadyQueued,
    /// The job is finished and the policy requires a reset first.
    AlreadyFinished,
}

impl EnqueueOutcome {
    /// Whether this call submitted the task.
    #[must_use]
    pub const fn submitted(&self) -> bool {
        matches!(self, Self::Submitted(_))
    }
}

/// One job record's lifecycle, as seen by a request.
///
/// Holds the record as of the last store operation. Reads are pure reads of
/// that snapshot; call [`Worker::refresh`] to observe the executor's progress.
#[derive(Clone)]
pub struct Worker {
    manager: WorkerManager,
    record: JobRecord,
    placeholder: Option<PlaceholderSettings>,
}

impl Worker {
    /// Use `placeholder` instead of the manager's settings for this worker.
    #[must_use]
    pub fn with_placeholder(mut self, placeholder: PlaceholderSettings) -> Self {
        self.placeholder = Some(placeholder);
        self
    }

    /// Show `src` as this worker's loading image.
    #[must_use]
    pub fn with_loading_img_src(mut self, src: impl Into<String>) -> Self {
        let mut placeholder = self.placeholder_settings().clone();
        placeholder.loading_img_src = Some(src.into());
        self.placeholder = Some(placeholder);
        self
    }

    /// Placeholder settings in effect for this worker.
    #[must_use]
    pub fn placeholder_settings(&self) -> &PlaceholderSettings {
        self.placeholder
            .as_ref()
            .unwrap_or(&self.manager.placeholder)
    }

    /// Record id.
    #[must_use]
    pub const fn id(&self) -> JobId {
        self.record.id
    }

    /// Record snapshot.
    #[must_use]
    pub const fn record(&self) -> &JobRecord {
        &self.record
    }

    /// Whether the job has finished.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.record.is_finished()
    }

    /// The job's result, present only when finished.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        self.record.result.as_ref()
    }

    /// Reload the record from the store.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::NotFound`] if the record has disappeared.
    pub async fn refresh(&mut self) -> JobResult<&JobRecord> {
        self.record = self
            .manager
            .store
            .get(self.record.id)
            .await?
            .ok_or_else(|| JobError::NotFound(self.record.id.to_string()))?;
        Ok(&self.record)
    }

    /// Submit the job unless a submission is already in flight.
    ///
    /// The record is claimed in the store before the task is handed to the
    /// executor, so concurrent callers produce exactly one submission. If the
    /// executor rejects the task the claim is rolled back.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::SubmissionFailed`] if the executor rejects the
    /// task, [`JobError::RollbackFailed`] if the job could not be returned to
    /// its prior state afterwards, or a store error.
    pub async fn enqueue(&mut self, callback: Option<String>) -> JobResult<EnqueueOutcome> {
        let stale = self.expired_submission().await?;
        let tracking_id = TrackingId::generate();
        let mut claim = Claim::new(tracking_id.clone())
            .with_callback(callback)
            .with_allow_finished(self.manager.settings.finished_policy.allows_requeue());
        if let Some(stale) = stale {
            claim = claim.superseding(stale);
        }

        let (prior, record) = match self.manager.store.claim(self.record.id, &claim).await? {
            ClaimOutcome::Claimed { prior, record } => (prior, record),
            ClaimOutcome::AlreadyQueued(record) => {
                debug!(job_id = %record.id, "job already queued, skipping submission");
                self.record = record;
                return Ok(EnqueueOutcome::AlreadyQueued);
            }
            ClaimOutcome::Finished(record) => {
                debug!(job_id = %record.id, "job finished, reset required before enqueue");
                self.record = record;
                return Ok(EnqueueOutcome::AlreadyFinished);
            }
        };
        self.record = record;

        let envelope = TaskEnvelope::new(self.record.id, tracking_id.clone());
        match self.manager.bridge.submit(&envelope).await {
            Ok(returned) => {
                if returned != tracking_id {
                    warn!(
                        job_id = %self.record.id,
                        expected = %tracking_id,
                        returned = %returned,
                        "executor returned a different tracking id"
                    );
                }
                info!(job_id = %self.record.id, tracking_id = %tracking_id, task = %self.record.payload.task, "job enqueued");
                Ok(EnqueueOutcome::Submitted(tracking_id))
            }
            Err(err) => {
                warn!(job_id = %self.record.id, error = %err, "submission failed, rolling back");
                let err = err.into_submission_failure();
                match self.manager.store.release(&prior, &tracking_id).await {
                    Ok(true) => self.record = prior,
                    Ok(false) => {
                        debug!(job_id = %self.record.id, "record changed since claim, rollback skipped");
                    }
                    Err(release_err) => {
                        error!(job_id = %self.record.id, tracking_id = %tracking_id, error = %release_err, "rollback after failed submission failed, job left queued");
                        let submission = match err {
                            JobError::SubmissionFailed(reason) => reason,
                            other => other.to_string(),
                        };
                        return Err(JobError::RollbackFailed {
                            submission,
                            rollback: release_err.to_string(),
                        });
                    }
                }
                Err(err)
            }
        }
    }

    /// Enqueue if needed and return the placeholder for the job.
    ///
    /// Repeated calls while queued submit nothing and return equivalent
    /// placeholders.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Worker::enqueue`].
    pub async fn invoke(&mut self, current_location: Option<&str>) -> JobResult<Placeholder> {
        self.enqueue(None).await?;
        Ok(Placeholder::from_record(
            &self.record,
            current_location,
            self.placeholder_settings(),
        ))
    }

    /// Return the job to `idle`.
    ///
    /// Resetting a queued job orphans its in-flight execution; the executor
    /// discards that result when it finishes.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn reset(&mut self) -> JobResult<()> {
        if self.record.is_queued() {
            warn!(job_id = %self.record.id, "resetting a queued job, in-flight execution will be discarded");
        }
        self.record = self.manager.store.reset(self.record.id).await?;
        info!(job_id = %self.record.id, "job reset");
        Ok(())
    }

    /// Store where clients resume after the job finishes.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub async fn set_callback(&mut self, callback: Option<String>) -> JobResult<()> {
        self.record = self
            .manager
            .store
            .set_callback(self.record.id, callback)
            .await?;
        Ok(())
    }

    /// Decide how to answer a resumption request for this job on its own.
    ///
    /// Not finished: enqueue if needed and return the placeholder. Finished:
    /// return the result, resetting first under [`TerminalPolicy::Reset`].
    ///
    /// # Errors
    ///
    /// Propagates store and submission errors.
    pub async fn resolve(
        &mut self,
        current_location: Option<&str>,
        policy: TerminalPolicy,
    ) -> JobResult<Resolution<Value>> {
        self.refresh().await?;
        if !self.is_finished() {
            return Ok(Resolution::Pending(self.invoke(current_location).await?));
        }

        let result = self.record.result.clone().unwrap_or(Value::Null);
        if policy.resets() {
            self.reset().await?;
        }
        Ok(Resolution::Completed(result))
    }

    /// Replace the payload if the job is idle; otherwise leave it unchanged.
    pub(crate) async fn replace_payload(&mut self, payload: &TaskDescriptor) -> JobResult<()> {
        self.record = self
            .manager
            .store
            .set_payload(self.record.id, payload)
            .await?;
        Ok(())
    }

    /// Tracking id of a queued submission that has outlived the configured
    /// expiry and is no longer pending in the executor.
    async fn expired_submission(&self) -> JobResult<Option<TrackingId>> {
        let Some(expiry) = self.manager.settings.queued_expiry() else {
            return Ok(None);
        };
        if !self.record.queued_longer_than(expiry, Utc::now()) {
            return Ok(None);
        }
        let Some(tracking_id) = self.record.external_job_id.clone() else {
            return Ok(None);
        };

        match self.manager.bridge.check_status(&tracking_id).await? {
            ExecutionStatus::Pending => {
                warn!(job_id = %self.record.id, tracking_id = %tracking_id, "queued job exceeded expiry but is still pending");
                Ok(None)
            }
            ExecutionStatus::Done => Ok(None),
            status @ (ExecutionStatus::Failed | ExecutionStatus::Unknown) => {
                warn!(job_id = %self.record.id, tracking_id = %tracking_id, status = %status, "queued job expired, resubmitting");
                Ok(Some(tracking_id))
            }
        }
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("record", &self.record)
            .field("placeholder", &self.placeholder)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{FailingBridge, RecordingBridge};
    use serde_json::json;

    fn manager(bridge: Arc<dyn ExecutorBridge>) -> (WorkerManager, MemoryStore) {
        let store = MemoryStore::new();
        (WorkerManager::new(Arc::new(store.clone()), bridge), store)
    }

    fn add() -> TaskDescriptor {
        TaskDescriptor::new("add").arg(2).arg(3)
    }

    #[tokio::test]
    async fn test_repeated_invoke_submits_once() {
        let bridge = RecordingBridge::new();
        let (manager, _) = manager(Arc::new(bridge.clone()));

        for _ in 0..5 {
            let mut worker = manager.worker("add", add()).await.unwrap();
            let placeholder = worker.invoke(Some("/index")).await.unwrap();
            assert_eq!(placeholder.status, super::super::JobStatus::Queued);
        }

        assert_eq!(bridge.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_submission_failure_leaves_job_idle() {
        let (manager, store) = manager(Arc::new(FailingBridge::new("queue down")));
        let mut worker = manager.worker("add", add()).await.unwrap();

        let err = worker.enqueue(None).await.unwrap_err();
        assert!(matches!(err, JobError::SubmissionFailed(_)));
        assert!(worker.record().is_idle());

        let stored = store.get(worker.id()).await.unwrap().unwrap();
        assert!(stored.is_idle());
        assert!(stored.external_job_id.is_none());
    }

    #[tokio::test]
    async fn test_finished_requires_reset_by_default() {
        let bridge = RecordingBridge::new();
        let (manager, store) = manager(Arc::new(bridge.clone()));
        let mut worker = manager.worker("add", add()).await.unwrap();

        let EnqueueOutcome::Submitted(tracking) = worker.enqueue(None).await.unwrap() else {
            panic!("expected submission");
        };
        store.finish(worker.id(), &tracking, json!(5)).await.unwrap();
        worker.refresh().await.unwrap();

        assert_eq!(worker.enqueue(None).await.unwrap(), EnqueueOutcome::AlreadyFinished);
        assert_eq!(bridge.submission_count(), 1);

        worker.reset().await.unwrap();
        assert!(!worker.is_finished());
        assert!(worker.enqueue(None).await.unwrap().submitted());
        assert_eq!(bridge.submission_count(), 2);
    }

    #[tokio::test]
    async fn test_auto_requeue_policy() {
        let bridge = RecordingBridge::new();
        let (manager, store) = manager(Arc::new(bridge.clone()));
        let manager = manager.with_settings(
            WorkerSettings::default().with_finished_policy(FinishedPolicy::AutoRequeue),
        );
        let mut worker = manager.worker("add", add()).await.unwrap();

        let EnqueueOutcome::Submitted(tracking) = worker.enqueue(None).await.unwrap() else {
            panic!("expected submission");
        };
        store.finish(worker.id(), &tracking, json!(5)).await.unwrap();

        assert!(worker.enqueue(None).await.unwrap().submitted());
        assert!(worker.record().result.is_none());
        assert_eq!(bridge.submission_count(), 2);
    }

    #[tokio::test]
    async fn test_enqueue_stores_explicit_callback() {
        let (manager, _) = manager(Arc::new(RecordingBridge::new()));
        let mut worker = manager.worker("callback", add()).await.unwrap();
        worker
            .enqueue(Some("/callback_route".to_string()))
            .await
            .unwrap();

        let placeholder = worker.invoke(Some("/callback")).await.unwrap();
        assert_eq!(placeholder.callback_target.as_deref(), Some("/callback_route"));
    }

    #[tokio::test]
    async fn test_resolve_completes_and_resets() {
        let bridge = RecordingBridge::new();
        let (manager, store) = manager(Arc::new(bridge.clone()));
        let mut worker = manager.worker("reset", add()).await.unwrap();

        let pending = worker.resolve(Some("/reset"), TerminalPolicy::Reset).await.unwrap();
        assert!(pending.is_pending());

        let tracking = worker.record().external_job_id.clone().unwrap();
        store.finish(worker.id(), &tracking, json!(5)).await.unwrap();

        let done = worker.resolve(Some("/reset"), TerminalPolicy::Reset).await.unwrap();
        assert_eq!(done.into_output(), Some(json!(5)));
        assert!(worker.record().is_idle());
    }

    #[tokio::test]
    async fn test_expired_submission_is_resubmitted() {
        let bridge = RecordingBridge::new();
        let (manager, store) = manager(Arc::new(bridge.clone()));
        let manager = manager
            .with_settings(WorkerSettings::default().with_queued_expiry(Duration::from_secs(0)));
        let mut worker = manager.worker("stuck", add()).await.unwrap();

        let EnqueueOutcome::Submitted(first) = worker.enqueue(None).await.unwrap() else {
            panic!("expected submission");
        };
        bridge.forget(&first);
        tokio::time::sleep(Duration::from_millis(5)).await;

        let EnqueueOutcome::Submitted(second) = worker.enqueue(None).await.unwrap() else {
            panic!("expected resubmission");
        };
        assert_ne!(first, second);
        assert_eq!(bridge.submission_count(), 2);

        assert!(store.finish(worker.id(), &first, json!(0)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_submission_with_live_lease_is_kept() {
        let bridge = RecordingBridge::new();
        let (manager, _) = manager(Arc::new(bridge.clone()));
        let manager = manager
            .with_settings(WorkerSettings::default().with_queued_expiry(Duration::from_secs(0)));
        let mut worker = manager.worker("busy", add()).await.unwrap();

        let EnqueueOutcome::Submitted(first) = worker.enqueue(None).await.unwrap() else {
            panic!("expected submission");
        };
        bridge.set_status(&first, ExecutionStatus::Pending);
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(worker.enqueue(None).await.unwrap(), EnqueueOutcome::AlreadyQueued);
        assert_eq!(bridge.submission_count(), 1);

        // The consumer died: its lease lapsed and the status is gone
        bridge.forget(&first);
        assert!(matches!(
            worker.enqueue(None).await.unwrap(),
            EnqueueOutcome::Submitted(_)
        ));
        assert_eq!(bridge.submission_count(), 2);
    }

    #[tokio::test]
    async fn test_per_worker_placeholder_override() {
        let (manager, _) = manager(Arc::new(RecordingBridge::new()));
        let manager = manager.with_placeholder(PlaceholderSettings {
            poll_interval_ms: 500,
            ..PlaceholderSettings::default()
        });

        let mut plain = manager.worker("plain", add()).await.unwrap();
        let placeholder = plain.invoke(None).await.unwrap();
        assert_eq!(placeholder.loading_img_src, None);
        assert_eq!(placeholder.poll_interval_ms, 500);

        let mut styled = manager
            .worker("styled", add())
            .await
            .unwrap()
            .with_loading_img_src("/static/spinner.gif");
        let placeholder = styled.invoke(None).await.unwrap();
        assert_eq!(placeholder.loading_img_src.as_deref(), Some("/static/spinner.gif"));
        assert_eq!(placeholder.poll_interval_ms, 500);
        assert!(placeholder.render_html().unwrap().contains("spinner.gif"));

        let mut custom = manager
            .worker("custom", add())
            .await
            .unwrap()
            .with_placeholder(PlaceholderSettings {
                status_endpoint: "/jobs/status".to_string(),
                ..PlaceholderSettings::default()
            });
        let placeholder = custom.invoke(None).await.unwrap();
        assert!(placeholder.status_url().unwrap().starts_with("/jobs/status?job_id="));
    }

    /// Memory store whose rollback always fails.
    #[derive(Clone)]
    struct StuckStore(MemoryStore);

    #[async_trait::async_trait]
    impl JobStore for StuckStore {
        async fn get(&self, id: JobId) -> JobResult<Option<JobRecord>> {
            self.0.get(id).await
        }

        async fn find_by_key(&self, key: &str) -> JobResult<Option<JobRecord>> {
            self.0.find_by_key(key).await
        }

        async fn get_or_create(&self, key: &str, payload: &TaskDescriptor) -> JobResult<JobRecord> {
            self.0.get_or_create(key, payload).await
        }

        async fn claim(&self, id: JobId, claim: &Claim) -> JobResult<ClaimOutcome> {
            self.0.claim(id, claim).await
        }

        async fn release(&self, _prior: &JobRecord, _tracking_id: &TrackingId) -> JobResult<bool> {
            Err(JobError::Other("database unavailable".to_string()))
        }

        async fn finish(
            &self,
            id: JobId,
            tracking_id: &TrackingId,
            result: Value,
        ) -> JobResult<Option<JobRecord>> {
            self.0.finish(id, tracking_id, result).await
        }

        async fn reset(&self, id: JobId) -> JobResult<JobRecord> {
            self.0.reset(id).await
        }

        async fn set_callback(&self, id: JobId, callback: Option<String>) -> JobResult<JobRecord> {
            self.0.set_callback(id, callback).await
        }

        async fn set_payload(&self, id: JobId, payload: &TaskDescriptor) -> JobResult<JobRecord> {
            self.0.set_payload(id, payload).await
        }
    }

    #[tokio::test]
    async fn test_failed_rollback_is_reported() {
        let store = MemoryStore::new();
        let manager = WorkerManager::new(
            Arc::new(StuckStore(store.clone())),
            Arc::new(FailingBridge::new("queue down")),
        );
        let mut worker = manager.worker("stranded", add()).await.unwrap();

        let err = worker.enqueue(None).await.unwrap_err();
        match err {
            JobError::RollbackFailed {
                submission,
                rollback,
            } => {
                assert_eq!(submission, "queue down");
                assert!(rollback.contains("database unavailable"));
            }
            other => panic!("expected rollback failure, got {other:?}"),
        }

        // Stranded until reset
        let stored = store.get(worker.id()).await.unwrap().unwrap();
        assert!(stored.is_queued());
    }

    #[tokio::test]
    async fn test_worker_by_id_missing() {
        let (manager, _) = manager(Arc::new(RecordingBridge::new()));
        let err = manager.worker_by_id(JobId::new()).await.unwrap_err();
        assert!(matches!(err, JobError::NotFound(_)));
    }
}
