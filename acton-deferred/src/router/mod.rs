//! Resumable step routers.
//!
//! A router is a durable cursor over a closed set of steps. Each request calls
//! [`Router::advance`], which runs the current step and follows the chain of
//! [`Outcome`]s it returns. A step that needs long-running work hands a
//! [`Worker`](crate::jobs::Worker) back with [`Outcome::Await`]; the router
//! parks on that step and returns the worker's placeholder. Once the worker has
//! finished, the next `advance` moves straight on to the continuation step.
//!
//! Steps re-execute from scratch on every `advance` until they hand off, so
//! expensive work belongs behind a worker. Steps marked as bookmarks record
//! themselves as the resume point before they run.
//!
//! # Example
//!
//! ```rust,no_run
//! use acton_deferred::jobs::TaskDescriptor;
//! use acton_deferred::router::{Outcome, Route, RouterResult, StepArgs, StepContext};
//! use async_trait::async_trait;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
//! enum Step {
//!     Greet,
//!     Compute,
//!     Report,
//! }
//!
//! struct Report;
//!
//! #[async_trait]
//! impl Route for Report {
//!     type Step = Step;
//!     type Output = String;
//!
//!     fn initial(&self) -> (Step, StepArgs) {
//!         (Step::Greet, StepArgs::new().with_arg("hello world"))
//!     }
//!
//!     fn is_bookmark(&self, step: Step) -> bool {
//!         matches!(step, Step::Compute | Step::Report)
//!     }
//!
//!     async fn call(
//!         &self,
//!         step: Step,
//!         args: StepArgs,
//!         cx: &mut StepContext,
//!     ) -> RouterResult<Outcome<Step, String>> {
//!         match step {
//!             Step::Greet => Ok(Outcome::Next(Step::Compute, StepArgs::new())),
//!             Step::Compute => {
//!                 let worker = cx
//!                     .worker("report", TaskDescriptor::new("sleep").kwarg("seconds", 5))
//!                     .await?;
//!                 Ok(Outcome::run_worker(worker, Step::Report, StepArgs::new().with_arg("done")))
//!             }
//!             Step::Report => Ok(Outcome::Done(args.arg::<String>(0)?)),
//!         }
//!     }
//! }
//! ```

mod engine;
mod record;
mod step;

pub use engine::{Route, Router, DEFAULT_MAX_HOPS};
pub use record::{RouterRecord, StoredRouter};
pub use step::{Outcome, StepArgs, StepContext};

use crate::jobs::JobError;
use thiserror::Error;

/// Result type for router operations.
pub type RouterResult<T> = Result<T, RouterError>;

/// Errors raised while advancing a router.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Stored state no longer matches the router definition or the jobs it
    /// delegates to.
    #[error("stale resume: {0}")]
    StaleResume(String),

    /// One `advance` followed more step transitions than allowed.
    #[error("router exceeded {0} step transitions in one advance")]
    StepLimitExceeded(usize),

    /// A step body failed.
    #[error("step failed: {0}")]
    StepFailed(String),

    /// Job or store error.
    #[error(transparent)]
    Job(#[from] JobError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
