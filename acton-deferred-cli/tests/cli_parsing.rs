//! Command line parsing tests

use acton_deferred_cli::commands::{DbCommand, JobsCommand};
use acton_deferred_cli::{Cli, Commands};
use clap::{CommandFactory, Parser};
use std::path::PathBuf;

#[test]
fn test_cli_definition_is_valid() {
    Cli::command().debug_assert();
}

#[test]
fn test_work_defaults() {
    let cli = Cli::try_parse_from(["acton-deferred", "work"]).unwrap();
    match cli.command {
        Commands::Work(work) => {
            assert_eq!(work.concurrency, 1);
            assert_eq!(work.poll_timeout, 1);
        }
        other => panic!("expected work, got {other:?}"),
    }
    assert!(cli.config.is_none());
    assert!(!cli.json_logs);
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "acton-deferred",
        "work",
        "--concurrency",
        "4",
        "--config",
        "prod.toml",
        "--json-logs",
    ])
    .unwrap();

    assert_eq!(cli.config, Some(PathBuf::from("prod.toml")));
    assert!(cli.json_logs);
    assert!(matches!(cli.command, Commands::Work(ref work) if work.concurrency == 4));
}

#[test]
fn test_jobs_run() {
    let cli = Cli::try_parse_from([
        "acton-deferred",
        "jobs",
        "run",
        "--job-id",
        "7f9c2ba4-e88f-4a3b-9d0e-6b2f0c4b6a11",
        "--force",
    ])
    .unwrap();

    match cli.command {
        Commands::Jobs {
            command: JobsCommand::Run { job_id, force },
        } => {
            assert_eq!(job_id, "7f9c2ba4-e88f-4a3b-9d0e-6b2f0c4b6a11");
            assert!(force);
        }
        other => panic!("expected jobs run, got {other:?}"),
    }
}

#[test]
fn test_jobs_key_commands() {
    let show = Cli::try_parse_from(["acton-deferred", "jobs", "show", "--key", "index"]).unwrap();
    assert!(matches!(
        show.command,
        Commands::Jobs { command: JobsCommand::Show { ref key } } if key == "index"
    ));

    let reset = Cli::try_parse_from(["acton-deferred", "jobs", "reset", "--key", "index"]).unwrap();
    assert!(matches!(
        reset.command,
        Commands::Jobs { command: JobsCommand::Reset { ref key } } if key == "index"
    ));
}

#[test]
fn test_jobs_status_requires_tracking_id() {
    assert!(Cli::try_parse_from(["acton-deferred", "jobs", "status"]).is_err());

    let cli = Cli::try_parse_from(["acton-deferred", "jobs", "status", "--tracking-id", "abc"])
        .unwrap();
    assert!(matches!(
        cli.command,
        Commands::Jobs { command: JobsCommand::Status { ref tracking_id } } if tracking_id == "abc"
    ));
}

#[test]
fn test_db_migrate() {
    let cli = Cli::try_parse_from(["acton-deferred", "db", "migrate"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Db {
            command: DbCommand::Migrate
        }
    ));
}
