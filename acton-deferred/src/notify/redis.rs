//! Redis pub/sub notifier.

use super::{Notification, Notifier};
use crate::jobs::{JobError, JobResult};
use async_trait::async_trait;
use deadpool_redis::Pool as RedisPool;
use tracing::debug;

/// Publishes job events with `PUBLISH` on `{prefix}{topic}`.
#[derive(Clone)]
pub struct RedisNotifier {
    pool: RedisPool,
    prefix: String,
}

impl RedisNotifier {
    /// Publish on channels named `deferred{topic}`.
    #[must_use]
    pub fn new(pool: RedisPool) -> Self {
        Self {
            pool,
            prefix: "deferred".to_string(),
        }
    }

    /// Use a different channel prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Channel a topic is published on.
    #[must_use]
    pub fn channel(&self, topic: &str) -> String {
        format!("{}{topic}", self.prefix)
    }
}

#[async_trait]
impl Notifier for RedisNotifier {
    async fn publish(&self, notification: &Notification) -> JobResult<()> {
        let channel = self.channel(&notification.topic);
        let payload = serde_json::to_string(notification)?;

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| JobError::Notify(format!("failed to get Redis connection: {e}")))?;
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(&channel)
            .arg(payload)
            .query_async(&mut *conn)
            .await
            .map_err(|e| JobError::Notify(format!("Redis PUBLISH failed: {e}")))?;

        debug!(channel = %channel, event = %notification.event, receivers, "published job event");
        Ok(())
    }
}

impl std::fmt::Debug for RedisNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisNotifier")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
