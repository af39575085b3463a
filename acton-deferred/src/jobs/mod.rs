//! Deferred jobs.
//!
//! A job is a named task plus its arguments, stored as a [`JobRecord`] and run
//! out-of-band by an executor. Request handlers interact with it through a
//! [`Worker`], which enqueues at most once per run and hands back a
//! [`Placeholder`] until the executor records a result.
//!
//! # Example
//!
//! ```rust,no_run
//! use acton_deferred::jobs::{TaskDescriptor, WorkerManager};
//! use acton_deferred::store::MemoryStore;
//! use acton_deferred::testing::RecordingBridge;
//! use std::sync::Arc;
//!
//! # async fn example() -> acton_deferred::jobs::JobResult<()> {
//! let manager = WorkerManager::new(Arc::new(MemoryStore::new()), Arc::new(RecordingBridge::new()));
//! let mut worker = manager
//!     .worker("index", TaskDescriptor::new("sleep").kwarg("seconds", 5))
//!     .await?;
//!
//! if !worker.is_finished() {
//!     let placeholder = worker.invoke(Some("/index")).await?;
//!     println!("{}", placeholder.render_html()?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod builtin;
mod error;
mod placeholder;
mod record;
mod task;
mod worker;

pub use error::{JobError, JobResult};
pub use placeholder::{Placeholder, PlaceholderSettings, DEFAULT_STATUS_ENDPOINT};
pub use record::{JobId, JobRecord, JobStatus, TrackingId};
pub use task::{FnTask, Task, TaskArgs, TaskDescriptor, TaskRegistry};
pub use worker::{EnqueueOutcome, FinishedPolicy, Worker, WorkerManager, WorkerSettings};
