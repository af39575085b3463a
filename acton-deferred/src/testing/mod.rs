//! Testing utilities for deferred jobs and routers
//!
//! This module provides test doubles for the executor side:
//! - [`RecordingBridge`] - Records submissions without running them; tests
//!   decide when and how each submission completes
//! - [`FailingBridge`] - Rejects every submission
//! - [`CountingTask`] - Task that counts its executions
//! - Assertion helpers for job records
//!
//! # Example
//!
//! ```rust
//! use acton_deferred::jobs::{TaskDescriptor, WorkerManager};
//! use acton_deferred::store::MemoryStore;
//! use acton_deferred::testing::RecordingBridge;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test_block(async {
//! let store = MemoryStore::new();
//! let bridge = RecordingBridge::new();
//! let manager = WorkerManager::new(Arc::new(store.clone()), Arc::new(bridge.clone()));
//!
//! let mut worker = manager.worker("add", TaskDescriptor::new("add").arg(2).arg(3)).await.unwrap();
//! worker.invoke(None).await.unwrap();
//! worker.invoke(None).await.unwrap();
//! assert_eq!(bridge.submission_count(), 1);
//!
//! bridge.complete(&store, json!(5)).await;
//! worker.refresh().await.unwrap();
//! assert!(worker.is_finished());
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use crate::bridge::{ExecutionStatus, ExecutorBridge, JobRunner, RunReport, TaskEnvelope};
use crate::jobs::{JobError, JobRecord, JobResult, JobStatus, Task, TaskArgs, TrackingId};
use crate::store::JobStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Recorded {
    submissions: Vec<TaskEnvelope>,
    statuses: HashMap<TrackingId, ExecutionStatus>,
}

/// Executor bridge that records submissions without running them.
///
/// Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingBridge {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingBridge {
    /// Create an empty bridge.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every envelope submitted so far, oldest first.
    #[must_use]
    pub fn submissions(&self) -> Vec<TaskEnvelope> {
        self.inner.lock().submissions.clone()
    }

    /// Number of submissions so far.
    #[must_use]
    pub fn submission_count(&self) -> usize {
        self.inner.lock().submissions.len()
    }

    /// The most recent submission.
    #[must_use]
    pub fn last_submission(&self) -> Option<TaskEnvelope> {
        self.inner.lock().submissions.last().cloned()
    }

    /// Override the status reported for a submission.
    pub fn set_status(&self, tracking_id: &TrackingId, status: ExecutionStatus) {
        self.inner
            .lock()
            .statuses
            .insert(tracking_id.clone(), status);
    }

    /// Forget a submission, as a queue that lost it would.
    pub fn forget(&self, tracking_id: &TrackingId) {
        self.inner.lock().statuses.remove(tracking_id);
    }

    fn pending(&self) -> Vec<TaskEnvelope> {
        let inner = self.inner.lock();
        inner
            .submissions
            .iter()
            .filter(|envelope| {
                inner.statuses.get(&envelope.tracking_id) == Some(&ExecutionStatus::Pending)
            })
            .cloned()
            .collect()
    }

    /// Finish every pending submission with `result`, writing straight to
    /// `store` as the executor would.
    ///
    /// Returns how many results were committed.
    ///
    /// # Panics
    ///
    /// Panics if the store rejects the write.
    pub async fn complete<S: JobStore + ?Sized>(&self, store: &S, result: Value) -> usize {
        let mut committed = 0;
        for envelope in self.pending() {
            let finished = store
                .finish(envelope.job_id, &envelope.tracking_id, result.clone())
                .await
                .expect("store rejected finish");
            if finished.is_some() {
                committed += 1;
            }
            self.set_status(&envelope.tracking_id, ExecutionStatus::Done);
        }
        committed
    }

    /// Run every pending submission through `runner`.
    ///
    /// Returns the report for each submission, in submission order.
    ///
    /// # Errors
    ///
    /// Returns the first runner error.
    pub async fn run_pending(&self, runner: &JobRunner) -> JobResult<Vec<RunReport>> {
        let mut reports = Vec::new();
        for envelope in self.pending() {
            let report = runner.run(&envelope).await?;
            self.set_status(&envelope.tracking_id, ExecutionStatus::Done);
            reports.push(report);
        }
        Ok(reports)
    }
}

#[async_trait]
impl ExecutorBridge for RecordingBridge {
    async fn submit(&self, envelope: &TaskEnvelope) -> JobResult<TrackingId> {
        let mut inner = self.inner.lock();
        inner.submissions.push(envelope.clone());
        inner
            .statuses
            .insert(envelope.tracking_id.clone(), ExecutionStatus::Pending);
        Ok(envelope.tracking_id.clone())
    }

    async fn check_status(&self, tracking_id: &TrackingId) -> JobResult<ExecutionStatus> {
        Ok(self
            .inner
            .lock()
            .statuses
            .get(tracking_id)
            .copied()
            .unwrap_or(ExecutionStatus::Unknown))
    }
}

/// Executor bridge that rejects every submission.
#[derive(Debug, Clone)]
pub struct FailingBridge {
    message: String,
    attempts: Arc<AtomicUsize>,
}

impl FailingBridge {
    /// Reject submissions with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            attempts: Arc::default(),
        }
    }

    /// Number of rejected submissions.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutorBridge for FailingBridge {
    async fn submit(&self, _envelope: &TaskEnvelope) -> JobResult<TrackingId> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(JobError::SubmissionFailed(self.message.clone()))
    }

    async fn check_status(&self, _tracking_id: &TrackingId) -> JobResult<ExecutionStatus> {
        Ok(ExecutionStatus::Unknown)
    }
}

/// Task that counts its executions and returns a fixed value.
#[derive(Debug, Clone)]
pub struct CountingTask {
    name: &'static str,
    result: Value,
    calls: Arc<AtomicUsize>,
}

impl CountingTask {
    /// Task registered as `name` returning `result`.
    #[must_use]
    pub fn new(name: &'static str, result: Value) -> Self {
        Self {
            name,
            result,
            calls: Arc::default(),
        }
    }

    /// Number of executions so far, across clones.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Task for CountingTask {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn execute(&self, _args: TaskArgs<'_>) -> JobResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }
}

/// Assert that `record` is queued.
///
/// # Panics
///
/// Panics if the record is not queued or has no tracking id
pub fn assert_queued(record: &JobRecord) {
    assert_eq!(
        record.status,
        JobStatus::Queued,
        "Expected job {} to be queued, got {}",
        record.id,
        record.status
    );
    assert!(
        record.external_job_id.is_some(),
        "Queued job {} has no tracking id",
        record.id
    );
}

/// Assert that `record` finished with `expected` as its result.
///
/// # Panics
///
/// Panics if the record is not finished or has a different result
pub fn assert_finished_with(record: &JobRecord, expected: &Value) {
    assert_eq!(
        record.status,
        JobStatus::Finished,
        "Expected job {} to be finished, got {}",
        record.id,
        record.status
    );
    assert_eq!(
        record.result.as_ref(),
        Some(expected),
        "Job {} finished with an unexpected result",
        record.id
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobId, TaskDescriptor};

    #[tokio::test]
    async fn test_recording_bridge_tracks_status() {
        let bridge = RecordingBridge::new();
        let envelope = TaskEnvelope::new(JobId::new(), TrackingId::generate());

        bridge.submit(&envelope).await.unwrap();
        assert_eq!(bridge.submission_count(), 1);
        assert_eq!(
            bridge.check_status(&envelope.tracking_id).await.unwrap(),
            ExecutionStatus::Pending
        );

        bridge.forget(&envelope.tracking_id);
        assert_eq!(
            bridge.check_status(&envelope.tracking_id).await.unwrap(),
            ExecutionStatus::Unknown
        );
    }

    #[tokio::test]
    async fn test_failing_bridge_counts_attempts() {
        let bridge = FailingBridge::new("down");
        let envelope = TaskEnvelope::new(JobId::new(), TrackingId::generate());
        assert!(bridge.submit(&envelope).await.is_err());
        assert_eq!(bridge.attempts(), 1);
    }

    #[tokio::test]
    async fn test_counting_task() {
        let task = CountingTask::new("count", serde_json::json!("ok"));
        let descriptor = TaskDescriptor::new("count");
        task.execute(descriptor.arguments()).await.unwrap();
        task.clone().execute(descriptor.arguments()).await.unwrap();
        assert_eq!(task.calls(), 2);
    }
}
