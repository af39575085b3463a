//! In-process executor: a bounded queue drained by a pool of tokio tasks.

use super::{ExecutionStatus, ExecutorBridge, JobRunner, RunReport, TaskEnvelope};
use crate::config::QueueConfig;
use crate::jobs::{JobError, JobResult, TrackingId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

type StatusMap = Arc<RwLock<HashMap<TrackingId, StatusEntry>>>;

#[derive(Debug, Clone, Copy)]
struct StatusEntry {
    status: ExecutionStatus,
    /// When the submission reached `Done` or `Failed`
    settled_at: Option<Instant>,
}

impl StatusEntry {
    const fn pending() -> Self {
        Self {
            status: ExecutionStatus::Pending,
            settled_at: None,
        }
    }

    fn settled(status: ExecutionStatus) -> Self {
        Self {
            status,
            settled_at: Some(Instant::now()),
        }
    }

    fn expired(&self, now: Instant, retention: Duration) -> bool {
        self.settled_at
            .is_some_and(|at| now.saturating_duration_since(at) >= retention)
    }
}

/// Executor running jobs on the current tokio runtime.
///
/// Submissions go onto a bounded channel; `concurrency` worker tasks take
/// envelopes off it and drive a shared [`JobRunner`]. Distinct jobs run in
/// parallel. A full queue rejects the submission instead of waiting.
///
/// Settled statuses are kept for the retention window and then report
/// [`ExecutionStatus::Unknown`], like an expired Redis status key.
pub struct LocalExecutor {
    sender: mpsc::Sender<TaskEnvelope>,
    statuses: StatusMap,
    retention: Duration,
    shutdown: watch::Sender<bool>,
    handles: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl LocalExecutor {
    /// Default number of envelopes buffered before submissions are rejected.
    pub const DEFAULT_CAPACITY: usize = 1_024;

    /// Default time a settled status stays queryable.
    pub const DEFAULT_RETENTION: Duration = Duration::from_secs(604_800);

    /// Spawn `concurrency` workers with the default queue capacity.
    #[must_use]
    pub fn spawn(runner: JobRunner, concurrency: usize) -> Self {
        Self::with_capacity(runner, concurrency, Self::DEFAULT_CAPACITY)
    }

    /// Spawn workers sized by `queue.local_concurrency`, keeping settled
    /// statuses for `queue.status_ttl_secs`.
    #[must_use]
    pub fn from_config(runner: JobRunner, queue: &QueueConfig) -> Self {
        Self::spawn(runner, queue.local_concurrency)
            .with_retention(Duration::from_secs(queue.status_ttl_secs))
    }

    /// Spawn `concurrency` workers sharing a queue of `capacity` envelopes.
    #[must_use]
    pub fn with_capacity(runner: JobRunner, concurrency: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let (shutdown, _) = watch::channel(false);
        let statuses: StatusMap = Arc::default();

        let handles = (0..concurrency.max(1))
            .map(|worker| {
                tokio::spawn(work_loop(
                    worker,
                    Arc::clone(&receiver),
                    runner.clone(),
                    Arc::clone(&statuses),
                    shutdown.subscribe(),
                ))
            })
            .collect();

        info!(concurrency, capacity, "local executor started");
        Self {
            sender,
            statuses,
            retention: Self::DEFAULT_RETENTION,
            shutdown,
            handles: parking_lot::Mutex::new(handles),
        }
    }

    /// Keep settled statuses for `retention`
    #[must_use]
    pub const fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Drop settled statuses older than the retention window.
    ///
    /// Runs on every submission; returns how many entries were removed.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let mut statuses = self.statuses.write();
        let before = statuses.len();
        statuses.retain(|_, entry| !entry.expired(now, self.retention));
        let pruned = before - statuses.len();
        if pruned > 0 {
            debug!(pruned, remaining = statuses.len(), "pruned settled job statuses");
        }
        pruned
    }

    /// Number of submissions whose status is still held.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.statuses.read().len()
    }

    /// Stop accepting work and wait for running jobs to finish.
    ///
    /// Envelopes still waiting in the queue are not run.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                error!(error = %err, "executor worker panicked");
            }
        }
        info!("local executor stopped");
    }

    /// Number of submissions currently tracked as pending.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.statuses
            .read()
            .values()
            .filter(|entry| matches!(entry.status, ExecutionStatus::Pending))
            .count()
    }
}

async fn work_loop(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<TaskEnvelope>>>,
    runner: JobRunner,
    statuses: StatusMap,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let envelope = tokio::select! {
            _ = shutdown.changed() => break,
            envelope = async { receiver.lock().await.recv().await } => match envelope {
                Some(envelope) => envelope,
                None => break,
            },
        };

        debug!(worker, job_id = %envelope.job_id, tracking_id = %envelope.tracking_id, "picked up job");
        let status = match runner.run(&envelope).await {
            Ok(RunReport::Finished { .. } | RunReport::Discarded | RunReport::Skipped) => {
                ExecutionStatus::Done
            }
            Err(err) => {
                error!(worker, job_id = %envelope.job_id, error = %err, "job run failed");
                ExecutionStatus::Failed
            }
        };
        statuses
            .write()
            .insert(envelope.tracking_id, StatusEntry::settled(status));
    }
    debug!(worker, "executor worker exiting");
}

#[async_trait]
impl ExecutorBridge for LocalExecutor {
    async fn submit(&self, envelope: &TaskEnvelope) -> JobResult<TrackingId> {
        if *self.shutdown.borrow() {
            return Err(JobError::SubmissionFailed(
                "local executor is shut down".to_string(),
            ));
        }

        self.prune();
        self.statuses
            .write()
            .insert(envelope.tracking_id.clone(), StatusEntry::pending());

        if let Err(err) = self.sender.try_send(envelope.clone()) {
            self.statuses.write().remove(&envelope.tracking_id);
            return Err(JobError::SubmissionFailed(format!(
                "local executor rejected job: {err}"
            )));
        }

        Ok(envelope.tracking_id.clone())
    }

    async fn check_status(&self, tracking_id: &TrackingId) -> JobResult<ExecutionStatus> {
        Ok(self
            .statuses
            .read()
            .get(tracking_id)
            .filter(|entry| !entry.expired(Instant::now(), self.retention))
            .map_or(ExecutionStatus::Unknown, |entry| entry.status))
    }
}

impl std::fmt::Debug for LocalExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalExecutor")
            .field("pending", &self.pending())
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}
