//! Step arguments, outcomes, and the per-advance context.

use super::{RouterError, RouterResult};
use crate::jobs::{JobId, TaskDescriptor, Worker, WorkerManager};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Positional and keyword arguments a step is invoked with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepArgs {
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Keyword arguments.
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl StepArgs {
    /// No arguments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    #[must_use]
    pub fn with_arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a keyword argument.
    #[must_use]
    pub fn with_kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Whether there are no arguments at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }

    /// Deserialize the positional argument at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::StaleResume`] if the argument is missing or has
    /// the wrong type; stored arguments no longer fit the step.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> RouterResult<T> {
        let value = self.args.get(index).ok_or_else(|| {
            RouterError::StaleResume(format!("missing positional argument {index}"))
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            RouterError::StaleResume(format!("positional argument {index}: {e}"))
        })
    }

    /// Deserialize the keyword argument `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::StaleResume`] if the argument is missing or has
    /// the wrong type.
    pub fn kwarg<T: DeserializeOwned>(&self, name: &str) -> RouterResult<T> {
        self.opt_kwarg(name)?
            .ok_or_else(|| RouterError::StaleResume(format!("missing keyword argument {name}")))
    }

    /// Deserialize the keyword argument `name`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::StaleResume`] if the argument has the wrong type.
    pub fn opt_kwarg<T: DeserializeOwned>(&self, name: &str) -> RouterResult<Option<T>> {
        self.kwargs
            .get(name)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| {
                    RouterError::StaleResume(format!("keyword argument {name}: {e}"))
                })
            })
            .transpose()
    }
}

/// What a step asks the router to do next.
#[derive(Debug)]
pub enum Outcome<S, O> {
    /// Terminal result.
    Done(O),
    /// Call another step immediately, in the same request.
    Next(S, StepArgs),
    /// Respond with `output` now and resume at `resume_at` on the next request.
    Yield {
        /// Response for this request.
        output: O,
        /// Step to resume at.
        resume_at: S,
        /// Arguments for the resume step.
        args: StepArgs,
    },
    /// Wait for `worker`, then continue at `next`.
    Await {
        /// Worker running the long computation.
        worker: Worker,
        /// Step to run once the worker has finished.
        next: S,
        /// Arguments for `next`.
        args: StepArgs,
    },
}

impl<S, O> Outcome<S, O> {
    /// Run `worker`, continuing at `next` with `args` once it has finished.
    #[must_use]
    pub const fn run_worker(worker: Worker, next: S, args: StepArgs) -> Self {
        Self::Await { worker, next, args }
    }
}

/// Context handed to every step during one `advance`.
#[derive(Debug)]
pub struct StepContext {
    manager: WorkerManager,
    current_location: Option<String>,
    jobs: Vec<JobId>,
}

impl StepContext {
    pub(crate) fn new(manager: WorkerManager, current_location: Option<&str>) -> Self {
        Self {
            manager,
            current_location: current_location.map(ToString::to_string),
            jobs: Vec::new(),
        }
    }

    /// Location of the request driving this advance.
    #[must_use]
    pub fn current_location(&self) -> Option<&str> {
        self.current_location.as_deref()
    }

    /// Worker manager.
    #[must_use]
    pub const fn manager(&self) -> &WorkerManager {
        &self.manager
    }

    /// Get the worker stored under `key` for delegation, creating it with
    /// `payload` if needed.
    ///
    /// An idle worker whose stored payload differs is updated to `payload`.
    /// A queued or finished worker running a different payload cannot serve
    /// this step.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::StaleResume`] if the stored job is queued or
    /// finished with a different payload.
    pub async fn worker(&mut self, key: &str, payload: TaskDescriptor) -> RouterResult<Worker> {
        let mut worker = self.manager.worker(key, payload.clone()).await?;

        if worker.record().payload != payload {
            if worker.record().is_idle() {
                worker.replace_payload(&payload).await?;
                debug!(job_id = %worker.id(), key, "updated idle job payload");
            }
            if worker.record().payload != payload {
                warn!(
                    job_id = %worker.id(),
                    key,
                    status = %worker.record().status,
                    stored = %worker.record().payload,
                    expected = %payload,
                    "delegated job runs a different payload"
                );
                return Err(RouterError::StaleResume(format!(
                    "job {key} is {} running {} but the step expects {payload}",
                    worker.record().status,
                    worker.record().payload
                )));
            }
        }

        self.track(worker.id());
        Ok(worker)
    }

    /// Record that this run uses job `id`, so a terminal reset resets it.
    pub fn track(&mut self, id: JobId) {
        if !self.jobs.contains(&id) {
            self.jobs.push(id);
        }
    }

    pub(crate) fn jobs(&self) -> &[JobId] {
        &self.jobs
    }
}
