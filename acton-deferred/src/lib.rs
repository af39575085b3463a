//! acton-deferred: Deferred background jobs and resumable routers for HTMX applications
//!
//! Long-running work never blocks a request. A handler asks for a
//! [`Worker`](jobs::Worker) by name, enqueues it at most once per run, and
//! answers with a [`Placeholder`](jobs::Placeholder) fragment until an
//! out-of-band executor commits the result. Multi-step flows are written as a
//! [`Route`](router::Route) whose state survives between requests.
//!
//! # Design Principles
//!
//! 1. **Request handlers never run tasks**: execution happens in an executor
//!    (an in-process pool or a separate `acton-deferred work` process)
//! 2. **At most one run in flight per job**: enqueueing is an atomic claim on
//!    the stored record
//! 3. **Commit before notify**: clients are told a job finished only after its
//!    result is durable
//! 4. **Typed steps**: a router's steps are a closed enum, so stale stored
//!    state is detected instead of silently misrouted
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use acton_deferred::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = MemoryStore::new();
//!     let runner = JobRunner::new(
//!         Arc::new(store.clone()),
//!         Arc::new(TaskRegistry::with_builtins()),
//!         Arc::new(NoopNotifier),
//!     );
//!     let executor = LocalExecutor::spawn(runner, 4);
//!     let manager = WorkerManager::new(Arc::new(store), Arc::new(executor));
//!
//!     let app = axum::Router::new()
//!         .route("/", axum::routing::get(index))
//!         .with_state(manager.clone())
//!         .merge(handlers::status_routes(manager));
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//!
//! async fn index(
//!     axum::extract::State(manager): axum::extract::State<WorkerManager>,
//! ) -> Result<Resolution<String>, DeferredError> {
//!     let mut worker = manager
//!         .worker("index", TaskDescriptor::new("add").arg(2).arg(3))
//!         .await?;
//!     let resolution = worker.resolve(Some("/"), TerminalPolicy::Retain).await?;
//!     Ok(resolution.map(|result| format!("result: {result}")))
//! }
//! ```
//!
//! # Features
//!
//! - `postgres` - `PostgreSQL` job and router store (default)
//! - `redis` - Redis executor queue and pub/sub notifications (default)

// Lint configuration is handled at the workspace level in Cargo.toml
#![allow(clippy::missing_errors_doc)]

pub mod bridge;
pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod notify;
pub mod observability;
pub mod resolution;
pub mod router;
pub mod store;
pub mod testing;

pub mod prelude {
    //! Convenience re-exports for common types and traits
    //!
    //! ```rust
    //! use acton_deferred::prelude::*;
    //! ```

    // Jobs
    pub use crate::jobs::{
        EnqueueOutcome, FinishedPolicy, JobError, JobId, JobRecord, JobResult, JobStatus,
        Placeholder, PlaceholderSettings, Task, TaskArgs, TaskDescriptor, TaskRegistry,
        TrackingId, Worker, WorkerManager, WorkerSettings,
    };

    // Routers
    pub use crate::router::{
        Outcome, Route, Router, RouterError, RouterResult, StepArgs, StepContext,
    };
    pub use crate::resolution::{Resolution, TerminalPolicy};

    // Executors and notifications
    pub use crate::bridge::{ExecutionStatus, ExecutorBridge, JobRunner, LocalExecutor};
    pub use crate::notify::{BroadcastNotifier, JobEvent, NoopNotifier, Notifier};

    // Storage
    pub use crate::store::{JobStore, MemoryStore, RouterStore};

    // HTTP
    pub use crate::handlers;

    // Error and configuration
    pub use crate::config::DeferredConfig;
    pub use crate::error::DeferredError;

    // Re-export key dependencies
    pub use async_trait::async_trait;
    pub use axum;

    // Convenience for JSON values
    pub use serde_json::json;
}
