//! Job management CLI commands

use acton_deferred::bridge::{ExecutionStatus, ExecutorBridge, RunReport, TaskEnvelope};
use acton_deferred::config::DeferredConfig;
use acton_deferred::jobs::{JobId, JobRecord, TaskRegistry, TrackingId};
use acton_deferred::store::{Claim, ClaimOutcome, JobStore};
use anyhow::{bail, Context, Result};
use clap::Subcommand;
use console::style;

use super::{connect_queue, connect_store, job_runner, INFO, SUCCESS, WARN};

/// Job management commands
#[derive(Debug, Clone, Subcommand)]
pub enum JobsCommand {
    /// Run one job record in this process
    Run {
        /// Job record id
        #[arg(long)]
        job_id: String,

        /// Run a finished job again, or take over a queued one
        ///
        /// A queued submission that has not started yet is skipped by the
        /// queue consumer once it is taken over.
        #[arg(short, long)]
        force: bool,
    },

    /// Show the executor status of a submission
    Status {
        /// Tracking id returned at enqueue time
        #[arg(long)]
        tracking_id: String,
    },

    /// Show the job stored under a key
    Show {
        /// Job key
        #[arg(long)]
        key: String,
    },

    /// Return the job stored under a key to idle
    Reset {
        /// Job key
        #[arg(long)]
        key: String,
    },
}

impl JobsCommand {
    /// Execute the jobs command
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The database or queue is not configured or unreachable
    /// - No job matches the given id or key
    /// - Invalid job ID provided
    pub async fn execute(&self, config: &DeferredConfig, registry: TaskRegistry) -> Result<()> {
        match self {
            Self::Run { job_id, force } => Self::run(config, registry, job_id, *force).await,
            Self::Status { tracking_id } => Self::status(config, tracking_id).await,
            Self::Show { key } => Self::show(config, key).await,
            Self::Reset { key } => Self::reset(config, key).await,
        }
    }

    async fn run(
        config: &DeferredConfig,
        registry: TaskRegistry,
        job_id: &str,
        force: bool,
    ) -> Result<()> {
        let id: JobId = job_id
            .parse()
            .with_context(|| format!("Invalid job id: {job_id}"))?;
        let store = connect_store(config).await?;
        let queue = connect_queue(config)?;

        let record = store
            .get(id)
            .await?
            .with_context(|| format!("No job with id {id}"))?;

        let claim = run_claim(&record, force)?;
        if let Some(queued) = claim.supersede.as_ref() {
            println!("{} Taking over queued submission {}", WARN, style(queued).dim());
        }
        let tracking_id = match store.claim(id, &claim).await? {
            ClaimOutcome::Claimed { .. } => claim.tracking_id.clone(),
            ClaimOutcome::AlreadyQueued(_) => {
                bail!("Job {id} was queued by another process; pass --force to take it over")
            }
            ClaimOutcome::Finished(_) => {
                bail!("Job {id} is finished; reset it or pass --force to run it again")
            }
        };

        println!("{} Running job {}", INFO, style(id).cyan());
        let runner = job_runner(store, registry, &queue);
        let report = runner.run(&TaskEnvelope::new(id, tracking_id.clone())).await?;

        match report {
            RunReport::Finished { record, notified } => {
                queue
                    .set_status(&tracking_id, ExecutionStatus::Done)
                    .await?;
                println!("{} Job finished", SUCCESS);
                print_record(&record);
                if !notified {
                    println!("{} job_finished could not be published", WARN);
                }
            }
            RunReport::Discarded => println!("{} Job was reset while running; result discarded", WARN),
            RunReport::Skipped => println!("{} Submission is no longer current; nothing ran", WARN),
        }
        Ok(())
    }

    async fn status(config: &DeferredConfig, tracking_id: &str) -> Result<()> {
        let queue = connect_queue(config)?;
        let status = queue.check_status(&TrackingId::from(tracking_id)).await?;

        let styled = if status.is_done() {
            style(status.name()).green()
        } else {
            style(status.name()).yellow()
        };
        println!("{} {}: {}", INFO, style(tracking_id).cyan(), styled);
        Ok(())
    }

    async fn show(config: &DeferredConfig, key: &str) -> Result<()> {
        let store = connect_store(config).await?;
        match store.find_by_key(key).await? {
            Some(record) => print_record(&record),
            None => println!("  {}", style(format!("(No job stored under {key})")).dim()),
        }
        Ok(())
    }

    async fn reset(config: &DeferredConfig, key: &str) -> Result<()> {
        let store = connect_store(config).await?;
        let record = store
            .find_by_key(key)
            .await?
            .with_context(|| format!("No job stored under {key}"))?;

        if record.is_queued() {
            println!(
                "{} Job is queued; its running execution will be discarded",
                style("Warning:").yellow()
            );
        }
        let record = store.reset(record.id).await?;
        println!("{} Job {} reset", SUCCESS, style(&record.key).cyan());
        Ok(())
    }
}

/// Claim that lets this process run `record` without racing the queue.
///
/// A queued record already has an envelope waiting for a consumer, so it is
/// refused unless `force` is set. A forced claim supersedes the queued
/// tracking id, which makes the consumer skip that envelope.
fn run_claim(record: &JobRecord, force: bool) -> Result<Claim> {
    let claim = Claim::new(TrackingId::generate()).with_allow_finished(force);
    if !record.is_queued() {
        return Ok(claim);
    }
    if !force {
        bail!(
            "Job {} is queued for a consumer; pass --force to take it over",
            record.id
        );
    }
    let queued = record
        .external_job_id
        .clone()
        .context("queued job has no tracking id")?;
    Ok(claim.superseding(queued))
}

fn print_record(record: &JobRecord) {
    println!("{}", style(format!("Job {}", record.key)).bold().underlined());
    println!("  ID:        {}", style(record.id).cyan());
    println!("  Status:    {}", style(record.status).yellow());
    println!("  Task:      {}", record.payload);
    if let Some(tracking_id) = &record.external_job_id {
        println!("  Tracking:  {tracking_id}");
    }
    if let Some(callback) = &record.callback_target {
        println!("  Callback:  {callback}");
    }
    if let Some(result) = &record.result {
        println!("  Result:    {}", style(result).green());
    }
    println!("  Updated:   {}", record.updated_at.to_rfc3339());
}
