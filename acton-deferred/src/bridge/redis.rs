//! Redis-backed executor queue.
//!
//! Submissions are pushed onto a Redis list as JSON envelopes. A separate
//! process (`acton-deferred work`) pops them with `BRPOP` and runs them. Each
//! submission also gets a status key, `{queue}:status:{tracking_id}`, which
//! expires after the configured retention.
//!
//! While a consumer runs a job it holds a short lease on that key, renewed on
//! a heartbeat. If the consumer dies the key lapses, the submission reports
//! [`ExecutionStatus::Unknown`], and an expired queued job is resubmitted.

use super::{ExecutionStatus, ExecutorBridge, JobRunner, RunReport, TaskEnvelope};
use crate::jobs::{JobError, JobResult, TrackingId};
use async_trait::async_trait;
use deadpool_redis::Pool as RedisPool;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Default status retention: 7 days.
pub const DEFAULT_STATUS_TTL_SECS: u64 = 604_800;

/// Default lease a consumer holds on a running job's status key.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(30);

/// Submits envelopes to a Redis list.
#[derive(Clone)]
pub struct RedisExecutor {
    pool: RedisPool,
    queue_name: String,
    status_ttl_secs: u64,
}

impl RedisExecutor {
    /// Push onto `queue_name` using connections from `pool`.
    #[must_use]
    pub fn new(pool: RedisPool, queue_name: impl Into<String>) -> Self {
        Self {
            pool,
            queue_name: queue_name.into(),
            status_ttl_secs: DEFAULT_STATUS_TTL_SECS,
        }
    }

    /// Open a connection pool for `url` and push onto `queue_name`.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Other`] if `url` is not a valid Redis URL.
    pub fn connect(url: &str, queue_name: impl Into<String>) -> JobResult<Self> {
        let pool = deadpool_redis::Config::from_url(url)
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| JobError::Other(format!("redis pool for {url}: {e}")))?;
        Ok(Self::new(pool, queue_name))
    }

    /// Connection pool shared with this executor.
    #[must_use]
    pub const fn pool(&self) -> &RedisPool {
        &self.pool
    }

    /// Keep status keys for `ttl_secs` seconds.
    #[must_use]
    pub const fn with_status_ttl(mut self, ttl_secs: u64) -> Self {
        self.status_ttl_secs = ttl_secs;
        self
    }

    /// Queue this executor pushes onto.
    #[must_use]
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    fn status_key(&self, tracking_id: &TrackingId) -> String {
        format!("{}:status:{tracking_id}", self.queue_name)
    }

    /// Record the status of a submission.
    ///
    /// # Errors
    ///
    /// Returns an error if Redis is unreachable.
    pub async fn set_status(
        &self,
        tracking_id: &TrackingId,
        status: ExecutionStatus,
    ) -> JobResult<()> {
        let mut conn = self.pool.get().await?;
        let _: () = redis::cmd("SET")
            .arg(self.status_key(tracking_id))
            .arg(status.name())
            .arg("EX")
            .arg(self.status_ttl_secs)
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }

    /// Mark a submission as running for `lease`.
    ///
    /// The key reverts to unknown unless renewed before the lease runs out.
    ///
    /// # Errors
    ///
    /// Returns an error if Redis is unreachable.
    pub async fn hold_lease(&self, tracking_id: &TrackingId, lease: Duration) -> JobResult<()> {
        let mut conn = self.pool.get().await?;
        let _: () = redis::cmd("SET")
            .arg(self.status_key(tracking_id))
            .arg(ExecutionStatus::Pending.name())
            .arg("EX")
            .arg(lease.as_secs().max(1))
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }

    /// Pop the next envelope, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if Redis is unreachable or the envelope is malformed.
    pub async fn pop(&self, timeout: Duration) -> JobResult<Option<TaskEnvelope>> {
        let mut conn = self.pool.get().await?;
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.queue_name)
            .arg(timeout.as_secs_f64())
            .query_async(&mut *conn)
            .await?;

        popped
            .map(|(_, json)| serde_json::from_str(&json).map_err(JobError::from))
            .transpose()
    }
}

#[async_trait]
impl ExecutorBridge for RedisExecutor {
    async fn submit(&self, envelope: &TaskEnvelope) -> JobResult<TrackingId> {
        let json = serde_json::to_string(envelope)?;
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| JobError::SubmissionFailed(format!("failed to get Redis connection: {e}")))?;

        let _: () = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(self.status_key(&envelope.tracking_id))
            .arg(ExecutionStatus::Pending.name())
            .arg("EX")
            .arg(self.status_ttl_secs)
            .ignore()
            .cmd("LPUSH")
            .arg(&self.queue_name)
            .arg(json)
            .ignore()
            .query_async(&mut *conn)
            .await
            .map_err(|e| JobError::SubmissionFailed(format!("Redis LPUSH failed: {e}")))?;

        debug!(queue = %self.queue_name, job_id = %envelope.job_id, tracking_id = %envelope.tracking_id, "pushed job onto queue");
        Ok(envelope.tracking_id.clone())
    }

    async fn check_status(&self, tracking_id: &TrackingId) -> JobResult<ExecutionStatus> {
        let mut conn = self.pool.get().await?;
        let status: Option<String> = redis::cmd("GET")
            .arg(self.status_key(tracking_id))
            .query_async(&mut *conn)
            .await?;

        Ok(status
            .and_then(|s| s.parse().ok())
            .unwrap_or(ExecutionStatus::Unknown))
    }
}

impl std::fmt::Debug for RedisExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisExecutor")
            .field("queue_name", &self.queue_name)
            .field("status_ttl_secs", &self.status_ttl_secs)
            .finish_non_exhaustive()
    }
}

/// Consumes a Redis queue and runs each envelope.
#[derive(Debug, Clone)]
pub struct RedisQueueConsumer {
    executor: RedisExecutor,
    runner: JobRunner,
    poll_timeout: Duration,
    lease: Duration,
}

impl RedisQueueConsumer {
    /// Consume `executor`'s queue with `runner`.
    #[must_use]
    pub const fn new(executor: RedisExecutor, runner: JobRunner) -> Self {
        Self {
            executor,
            runner,
            poll_timeout: Duration::from_secs(1),
            lease: DEFAULT_LEASE,
        }
    }

    /// Lease held on a running job's status key.
    #[must_use]
    pub const fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// How often a running job's lease is renewed: a third of the lease,
    /// never under a second.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        (self.lease / 3).max(Duration::from_secs(1))
    }

    async fn renew(&self, tracking_id: &TrackingId) {
        if let Err(err) = self.executor.hold_lease(tracking_id, self.lease).await {
            warn!(tracking_id = %tracking_id, error = %err, "failed to renew job lease");
        }
    }

    /// How long one `BRPOP` waits before checking for shutdown.
    #[must_use]
    pub const fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Pop and run one envelope, if any arrives within the poll timeout.
    ///
    /// Returns whether an envelope was processed.
    ///
    /// # Errors
    ///
    /// Returns an error if Redis is unreachable.
    pub async fn run_once(&self) -> JobResult<bool> {
        let Some(envelope) = self.executor.pop(self.poll_timeout).await? else {
            return Ok(false);
        };

        let tracking_id = &envelope.tracking_id;
        self.renew(tracking_id).await;
        let run = with_heartbeat(self.runner.run(&envelope), self.heartbeat_interval(), move || {
            self.renew(tracking_id)
        });

        let status = match run.await {
            Ok(RunReport::Finished { notified: false, .. }) => {
                warn!(job_id = %envelope.job_id, "job finished but job_finished was not published");
                ExecutionStatus::Done
            }
            Ok(_) => ExecutionStatus::Done,
            Err(err) => {
                error!(job_id = %envelope.job_id, error = %err, "job run failed");
                ExecutionStatus::Failed
            }
        };
        self.executor
            .set_status(&envelope.tracking_id, status)
            .await?;
        Ok(true)
    }

    /// Run until `shutdown` flips to `true`.
    ///
    /// Shutdown is checked between envelopes, so a running job always
    /// completes. Connection errors are logged and retried after a short pause.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        info!(queue = %self.executor.queue_name, "consuming job queue");
        while !*shutdown.borrow() {
            if let Err(err) = self.run_once().await {
                error!(error = %err, "queue consumer error");
                tokio::time::sleep(self.poll_timeout).await;
            }
        }
        info!(queue = %self.executor.queue_name, "queue consumer stopped");
    }
}

/// Drive `work` to completion, calling `beat` every `interval` meanwhile.
async fn with_heartbeat<W, H, F>(work: W, interval: Duration, mut beat: H) -> W::Output
where
    W: Future,
    H: FnMut() -> F,
    F: Future<Output = ()>,
{
    tokio::pin!(work);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            output = &mut work => return output,
            _ = ticker.tick() => beat().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::TaskRegistry;
    use crate::notify::NoopNotifier;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_renews_while_work_runs() {
        let counter = AtomicUsize::new(0);
        let beats = &counter;
        let output = with_heartbeat(
            async {
                tokio::time::sleep(Duration::from_secs(95)).await;
                "done"
            },
            Duration::from_secs(10),
            move || async move {
                beats.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await;

        assert_eq!(output, "done");
        assert_eq!(counter.load(Ordering::SeqCst), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_work_never_beats() {
        let counter = AtomicUsize::new(0);
        let beats = &counter;
        with_heartbeat(
            async { tokio::time::sleep(Duration::from_millis(50)).await },
            Duration::from_secs(10),
            move || async move {
                beats.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await;

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_heartbeat_renews_well_inside_the_lease() {
        let executor = RedisExecutor::connect("redis://127.0.0.1:6379", "test:queue").unwrap();
        let runner = JobRunner::new(
            Arc::new(MemoryStore::new()),
            Arc::new(TaskRegistry::with_builtins()),
            Arc::new(NoopNotifier),
        );
        let consumer = RedisQueueConsumer::new(executor, runner);
        assert_eq!(consumer.heartbeat_interval(), Duration::from_secs(10));

        let short = consumer.with_lease(Duration::from_secs(2));
        assert_eq!(short.heartbeat_interval(), Duration::from_secs(1));
        assert!(short.heartbeat_interval() < short.lease);
    }
}
