//! acton-deferred CLI tool

#![forbid(unsafe_code)]

use acton_deferred::jobs::TaskRegistry;
use acton_deferred::observability::{self, ObservabilityConfig};
use acton_deferred_cli::Cli;
use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    observability::init(&ObservabilityConfig::new("acton-deferred").with_json(cli.json_logs))?;

    acton_deferred_cli::run(cli, TaskRegistry::with_builtins()).await
}
