//! Executor-side job execution.

use super::TaskEnvelope;
use crate::jobs::{JobError, JobRecord, JobResult, TaskRegistry};
use crate::notify::{JobEvent, Notification, Notifier};
use crate::store::JobStore;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What happened to one envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum RunReport {
    /// The result was committed.
    Finished {
        /// Committed record.
        record: JobRecord,
        /// Whether `job_finished` was published.
        notified: bool,
    },
    /// The record was reset or resubmitted while the task ran; the result
    /// was discarded.
    Discarded,
    /// The record was not queued under this submission; nothing ran.
    Skipped,
}

impl RunReport {
    /// Whether the run committed a result and published `job_finished`.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Finished { notified: true, .. })
    }
}

/// Runs job envelopes: load, execute, commit, notify.
#[derive(Clone)]
pub struct JobRunner {
    store: Arc<dyn JobStore>,
    registry: Arc<TaskRegistry>,
    notifier: Arc<dyn Notifier>,
}

impl JobRunner {
    /// Create a runner.
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<TaskRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            registry,
            notifier,
        }
    }

    /// Task registry.
    #[must_use]
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Run one envelope.
    ///
    /// The result is committed before `job_finished` is published. A task
    /// that fails still finishes the job, with `{"error": message}` as its
    /// result, so that waiting clients resolve.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::NotFound`] if the record does not exist, or a
    /// store error if the result cannot be committed.
    pub async fn run(&self, envelope: &TaskEnvelope) -> JobResult<RunReport> {
        let record = self
            .store
            .get(envelope.job_id)
            .await?
            .ok_or_else(|| JobError::NotFound(envelope.job_id.to_string()))?;

        if !record.is_queued_as(&envelope.tracking_id) {
            warn!(
                job_id = %record.id,
                tracking_id = %envelope.tracking_id,
                status = %record.status,
                "submission is no longer current, skipping"
            );
            return Ok(RunReport::Skipped);
        }

        self.notify(&Notification::new(record.id, JobEvent::Started))
            .await;

        let started = Instant::now();
        info!(job_id = %record.id, task = %record.payload, "executing job");
        let result = self.execute(&record).await;

        let Some(committed) = self
            .store
            .finish(record.id, &envelope.tracking_id, result)
            .await?
        else {
            warn!(job_id = %record.id, tracking_id = %envelope.tracking_id, "job reset while running, result discarded");
            return Ok(RunReport::Discarded);
        };

        info!(
            job_id = %committed.id,
            elapsed_ms = started.elapsed().as_millis(),
            "job finished"
        );

        let notified = self
            .notify(&Notification::new(committed.id, JobEvent::Finished))
            .await;
        Ok(RunReport::Finished {
            record: committed,
            notified,
        })
    }

    async fn execute(&self, record: &JobRecord) -> Value {
        let outcome = match self.registry.resolve(&record.payload.task) {
            Ok(task) => task.execute(record.payload.arguments()).await,
            Err(err) => Err(err),
        };

        outcome.unwrap_or_else(|err| {
            error!(job_id = %record.id, error = %err, "task failed");
            json!({ "error": err.to_string() })
        })
    }

    async fn notify(&self, notification: &Notification) -> bool {
        match self.notifier.publish(notification).await {
            Ok(()) => {
                debug!(topic = %notification.topic, event = %notification.event, "notified");
                true
            }
            Err(err) => {
                error!(topic = %notification.topic, event = %notification.event, error = %err, "failed to publish job event");
                false
            }
        }
    }
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobId, TaskDescriptor, TrackingId};
    use crate::notify::BroadcastNotifier;
    use crate::store::{Claim, MemoryStore};

    struct Fixture {
        store: MemoryStore,
        notifier: BroadcastNotifier,
        runner: JobRunner,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let notifier = BroadcastNotifier::default();
        let runner = JobRunner::new(
            Arc::new(store.clone()),
            Arc::new(TaskRegistry::with_builtins()),
            Arc::new(notifier.clone()),
        );
        Fixture {
            store,
            notifier,
            runner,
        }
    }

    async fn queued(store: &MemoryStore, payload: TaskDescriptor) -> TaskEnvelope {
        let record = store.get_or_create("job", &payload).await.unwrap();
        let tracking = TrackingId::generate();
        store
            .claim(record.id, &Claim::new(tracking.clone()))
            .await
            .unwrap();
        TaskEnvelope::new(record.id, tracking)
    }

    #[tokio::test]
    async fn test_run_commits_then_notifies() {
        let fx = fixture();
        let mut events = fx.notifier.subscribe();
        let envelope = queued(&fx.store, TaskDescriptor::new("add").arg(2).arg(3)).await;

        let report = fx.runner.run(&envelope).await.unwrap();
        assert!(report.is_complete());

        assert_eq!(events.recv().await.unwrap().event, JobEvent::Started);
        let finished = events.recv().await.unwrap();
        assert_eq!(finished.event, JobEvent::Finished);

        let record = fx.store.get(envelope.job_id).await.unwrap().unwrap();
        assert!(record.is_finished());
        assert_eq!(record.result, Some(json!(5)));
    }

    #[tokio::test]
    async fn test_task_failure_is_recorded_as_result() {
        let fx = fixture();
        let envelope = queued(&fx.store, TaskDescriptor::new("missing-task")).await;

        fx.runner.run(&envelope).await.unwrap();

        let record = fx.store.get(envelope.job_id).await.unwrap().unwrap();
        assert!(record.is_finished());
        let result = record.result.unwrap();
        assert!(result["error"].as_str().unwrap().contains("missing-task"));
    }

    #[tokio::test]
    async fn test_stale_envelope_is_skipped() {
        let fx = fixture();
        let envelope = queued(&fx.store, TaskDescriptor::new("add").arg(1)).await;
        fx.store.reset(envelope.job_id).await.unwrap();

        let report = fx.runner.run(&envelope).await.unwrap();
        assert_eq!(report, RunReport::Skipped);
        assert!(fx.store.get(envelope.job_id).await.unwrap().unwrap().is_idle());
    }

    #[tokio::test]
    async fn test_unknown_record_is_not_found() {
        let fx = fixture();
        let envelope = TaskEnvelope::new(JobId::new(), TrackingId::generate());
        let err = fx.runner.run(&envelope).await.unwrap_err();
        assert!(matches!(err, JobError::NotFound(_)));
    }
}
