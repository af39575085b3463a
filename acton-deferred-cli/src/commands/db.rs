//! Database management commands

use acton_deferred::config::DeferredConfig;
use anyhow::Result;
use clap::Subcommand;
use console::style;

use super::{connect_store, INFO, SUCCESS};

/// Database commands
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum DbCommand {
    /// Create the job and router tables
    Migrate,
}

impl DbCommand {
    /// Execute the database command
    ///
    /// # Errors
    ///
    /// Returns an error if the database is not configured, unreachable, or
    /// rejects the schema.
    pub async fn execute(self, config: &DeferredConfig) -> Result<()> {
        match self {
            Self::Migrate => {
                println!("{} Applying schema...", INFO);
                let store = connect_store(config).await?;
                store.migrate().await?;
                println!(
                    "{} Tables {} and {} are ready",
                    SUCCESS,
                    style("deferred_jobs").cyan(),
                    style("deferred_routers").cyan()
                );
                Ok(())
            }
        }
    }
}
