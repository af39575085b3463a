//! acton-deferred CLI library
//!
//! The executor side of acton-deferred: consumes the Redis job queue, runs
//! individual job records, and inspects or resets stored jobs. Applications
//! with their own tasks build a binary around [`run`] with their own
//! [`TaskRegistry`].
//!
//! ```rust,no_run
//! use acton_deferred::jobs::TaskRegistry;
//! use acton_deferred_cli::Cli;
//! use clap::Parser;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = TaskRegistry::with_builtins();
//!     acton_deferred_cli::run(Cli::parse(), registry).await
//! }
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc)]

pub mod commands;

use std::path::PathBuf;

use acton_deferred::config::DeferredConfig;
use acton_deferred::jobs::TaskRegistry;
use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{DbCommand, JobsCommand, WorkCommand};

/// Command line interface
#[derive(Debug, Parser)]
#[command(name = "acton-deferred")]
#[command(version)]
#[command(about = "Executor and job management for acton-deferred", long_about = None)]
pub struct Cli {
    /// Configuration file layered over `./deferred.toml`
    #[arg(short, long, global = true, env = "ACTON_DEFERRED_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Consume the job queue and run jobs until interrupted
    Work(WorkCommand),
    /// Inspect, run, and reset job records
    Jobs {
        /// Jobs subcommand
        #[command(subcommand)]
        command: JobsCommand,
    },
    /// Database management commands
    Db {
        /// Database subcommand
        #[command(subcommand)]
        command: DbCommand,
    },
}

impl Cli {
    /// Load configuration, honoring `--config`.
    pub fn load_config(&self) -> Result<DeferredConfig> {
        let config = match &self.config {
            Some(path) => DeferredConfig::load_from(path)?,
            None => DeferredConfig::load()?,
        };
        Ok(config)
    }
}

/// Run a parsed command line with the given task registry.
pub async fn run(cli: Cli, registry: TaskRegistry) -> Result<()> {
    let config = cli.load_config()?;
    match cli.command {
        Commands::Work(command) => command.execute(&config, registry).await,
        Commands::Jobs { command } => command.execute(&config, registry).await,
        Commands::Db { command } => command.execute(&config).await,
    }
}
