//! CLI command implementations

pub mod db;
pub mod jobs;
pub mod work;

pub use db::DbCommand;
pub use jobs::JobsCommand;
pub use work::WorkCommand;

use std::sync::Arc;

use acton_deferred::bridge::{JobRunner, RedisExecutor};
use acton_deferred::config::DeferredConfig;
use acton_deferred::jobs::TaskRegistry;
use acton_deferred::notify::RedisNotifier;
use acton_deferred::store::PgStore;
use anyhow::{Context, Result};
use console::Emoji;

pub(crate) static SUCCESS: Emoji = Emoji("✓", "√");
pub(crate) static INFO: Emoji = Emoji("ℹ", "i");
pub(crate) static WARN: Emoji = Emoji("⚠", "!");

/// Connect to the configured job database.
pub(crate) async fn connect_store(config: &DeferredConfig) -> Result<PgStore> {
    let url = config
        .database
        .url
        .as_deref()
        .context("database.url is not configured (set ACTON_DEFERRED_DATABASE__URL)")?;
    let store = PgStore::connect(url, config.database.max_connections)
        .await
        .with_context(|| format!("Failed to connect to {url}"))?;
    Ok(store)
}

/// Open the configured Redis queue.
pub(crate) fn connect_queue(config: &DeferredConfig) -> Result<RedisExecutor> {
    let url = config
        .queue
        .redis_url
        .as_deref()
        .context("queue.redis_url is not configured (set ACTON_DEFERRED_QUEUE__REDIS_URL)")?;
    let executor = RedisExecutor::connect(url, config.queue.queue_name.clone())?
        .with_status_ttl(config.queue.status_ttl_secs);
    Ok(executor)
}

/// Runner committing to `store` and publishing on the queue's Redis.
pub(crate) fn job_runner(
    store: PgStore,
    registry: TaskRegistry,
    queue: &RedisExecutor,
) -> JobRunner {
    JobRunner::new(
        Arc::new(store),
        Arc::new(registry),
        Arc::new(RedisNotifier::new(queue.pool().clone())),
    )
}
