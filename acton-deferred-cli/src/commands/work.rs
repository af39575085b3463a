//! Queue consumer: the executor process

use std::time::Duration;

use acton_deferred::bridge::RedisQueueConsumer;
use acton_deferred::config::DeferredConfig;
use acton_deferred::jobs::TaskRegistry;
use anyhow::Result;
use clap::Args;
use console::style;
use tokio::sync::watch;
use tracing::{error, info};

use super::{connect_queue, connect_store, job_runner, INFO, SUCCESS};

/// Consume the job queue
#[derive(Debug, Clone, Args)]
pub struct WorkCommand {
    /// Number of jobs to run at once
    #[arg(short, long, default_value = "1")]
    pub concurrency: usize,

    /// Seconds each queue poll waits before checking for shutdown
    #[arg(long, default_value = "1")]
    pub poll_timeout: u64,
}

impl WorkCommand {
    /// Run consumers until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The database or queue is not configured
    /// - The database is unreachable
    pub async fn execute(&self, config: &DeferredConfig, registry: TaskRegistry) -> Result<()> {
        let store = connect_store(config).await?;
        let queue = connect_queue(config)?;
        let tasks = registry.names().join(", ");
        let runner = job_runner(store, registry, &queue);
        let consumer = RedisQueueConsumer::new(queue, runner)
            .with_poll_timeout(Duration::from_secs(self.poll_timeout.max(1)));

        println!(
            "{} Consuming {} with {} worker(s)",
            INFO,
            style(&config.queue.queue_name).cyan(),
            self.concurrency.max(1)
        );
        println!("  Tasks: {}", style(tasks).dim());

        let (shutdown, _) = watch::channel(false);
        let handles: Vec<_> = (0..self.concurrency.max(1))
            .map(|_| {
                let consumer = consumer.clone();
                let signal = shutdown.subscribe();
                tokio::spawn(async move { consumer.run(signal).await })
            })
            .collect();

        tokio::signal::ctrl_c().await?;
        info!("shutdown requested, finishing running jobs");
        println!("{} Finishing running jobs...", INFO);
        shutdown.send_replace(true);

        for handle in handles {
            if let Err(err) = handle.await {
                error!(error = %err, "queue consumer panicked");
            }
        }

        println!("{} Executor stopped", SUCCESS);
        Ok(())
    }
}
