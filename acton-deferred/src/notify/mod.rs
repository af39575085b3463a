//! Job event notifications.
//!
//! The executor publishes `job_started` before running a task and
//! `job_finished` after the result is committed, on a topic derived from the
//! job id. Clients that miss an event fall back to the status-check route.

#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "redis")]
pub use self::redis::RedisNotifier;

use crate::jobs::{JobId, JobResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tracing::trace;

/// Lifecycle events published for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobEvent {
    /// The executor picked the job up.
    #[serde(rename = "job_started")]
    Started,
    /// The result was committed.
    #[serde(rename = "job_finished")]
    Finished,
}

impl JobEvent {
    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Started => "job_started",
            Self::Finished => "job_finished",
        }
    }
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Notification topic for a job.
#[must_use]
pub fn topic_for(id: JobId) -> String {
    format!("/{id}")
}

/// One published event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Topic the event is published on.
    pub topic: String,
    /// Job the event is about.
    pub job_id: JobId,
    /// The event.
    pub event: JobEvent,
}

impl Notification {
    /// Build the notification for `event` on `job_id`'s topic.
    #[must_use]
    pub fn new(job_id: JobId, event: JobEvent) -> Self {
        Self {
            topic: topic_for(job_id),
            job_id,
            event,
        }
    }
}

/// Publishes job events.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Publish one notification.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Notify`](crate::jobs::JobError::Notify) if the
    /// transport rejects the event.
    async fn publish(&self, notification: &Notification) -> JobResult<()>;
}

/// In-process notifier backed by a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    /// Create a notifier buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn publish(&self, notification: &Notification) -> JobResult<()> {
        // No subscribers is not an error; clients can still poll.
        let delivered = self.sender.send(notification.clone()).unwrap_or(0);
        trace!(topic = %notification.topic, event = %notification.event, delivered, "published job event");
        Ok(())
    }
}

/// Notifier that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn publish(&self, _notification: &Notification) -> JobResult<()> {
        Ok(())
    }
}
