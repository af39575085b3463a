//! The router engine.

use super::{Outcome, RouterError, RouterRecord, RouterResult, StepArgs, StepContext};
use crate::config::RouterSettings;
use crate::jobs::WorkerManager;
use crate::resolution::{Resolution, TerminalPolicy};
use crate::store::RouterStore;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Step transitions one `advance` may follow before giving up.
pub const DEFAULT_MAX_HOPS: usize = 64;

/// A router definition: a closed set of steps and their bodies.
#[async_trait]
pub trait Route: Send + Sync + 'static {
    /// Step identifiers.
    type Step: Copy + Eq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// What the router produces for the caller.
    type Output: Send + 'static;

    /// Step and arguments a fresh or reset router starts at.
    fn initial(&self) -> (Self::Step, StepArgs);

    /// Whether `step` records itself as the resume point before it runs.
    fn is_bookmark(&self, step: Self::Step) -> bool {
        let _ = step;
        false
    }

    /// Run one step.
    ///
    /// # Errors
    ///
    /// Returns an error if the step fails; the router stays where it was.
    async fn call(
        &self,
        step: Self::Step,
        args: StepArgs,
        cx: &mut StepContext,
    ) -> RouterResult<Outcome<Self::Step, Self::Output>>;
}

/// A durable cursor over a [`Route`].
pub struct Router<R: Route> {
    route: R,
    store: Arc<dyn RouterStore>,
    manager: WorkerManager,
    record: RouterRecord<R::Step>,
    policy: TerminalPolicy,
    max_hops: usize,
}

impl<R: Route> Router<R> {
    /// Load the router stored under `key`, creating it at the route's initial
    /// step if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::StaleResume`] if the stored step is not a step
    /// of `R`, or a store error.
    pub async fn load_or_create(
        route: R,
        key: &str,
        store: Arc<dyn RouterStore>,
        manager: WorkerManager,
    ) -> RouterResult<Self> {
        let record = match store.load(key).await? {
            Some(stored) => RouterRecord::decode(stored)?,
            None => {
                let (step, args) = route.initial();
                let record = RouterRecord::new(key, step, args);
                store.save(&record.encode()?).await?;
                debug!(router = key, step = ?step, "created router");
                record
            }
        };

        Ok(Self {
            route,
            store,
            manager,
            record,
            policy: TerminalPolicy::default(),
            max_hops: DEFAULT_MAX_HOPS,
        })
    }

    /// Set what happens when the terminal step returns.
    #[must_use]
    pub const fn with_terminal_policy(mut self, policy: TerminalPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Apply configured router behavior.
    #[must_use]
    pub const fn with_settings(self, settings: &RouterSettings) -> Self {
        self.with_terminal_policy(settings.terminal_policy)
    }

    /// What happens when the terminal step returns.
    #[must_use]
    pub const fn terminal_policy(&self) -> TerminalPolicy {
        self.policy
    }

    /// Limit step transitions per `advance`.
    #[must_use]
    pub const fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    /// Stored state.
    #[must_use]
    pub const fn record(&self) -> &RouterRecord<R::Step> {
        &self.record
    }

    /// Step the next `advance` starts at.
    #[must_use]
    pub const fn current_step(&self) -> R::Step {
        self.record.current_step
    }

    /// Router definition.
    #[must_use]
    pub const fn route(&self) -> &R {
        &self.route
    }

    /// Run the current step and follow its outcomes.
    ///
    /// Returns the awaited worker's placeholder while it runs, the output of a
    /// yielding step, or the terminal output.
    ///
    /// # Errors
    ///
    /// Returns step errors, [`RouterError::StaleResume`] when stored state no
    /// longer fits, and [`RouterError::StepLimitExceeded`] when steps keep
    /// handing off to each other.
    pub async fn advance(
        &mut self,
        current_location: Option<&str>,
    ) -> RouterResult<Resolution<R::Output>> {
        let mut cx = StepContext::new(self.manager.clone(), current_location);
        let mut step = self.record.current_step;
        let mut args = self.record.args.clone();

        for _ in 0..self.max_hops {
            if self.route.is_bookmark(step)
                && (self.record.current_step != step || self.record.args != args)
            {
                debug!(router = %self.record.key, step = ?step, "bookmarking step");
                self.record.bookmark(step, args.clone());
                self.persist().await?;
            }

            debug!(router = %self.record.key, step = ?step, "running step");
            match self.route.call(step, args.clone(), &mut cx).await? {
                Outcome::Next(next, next_args) => {
                    step = next;
                    args = next_args;
                }
                Outcome::Yield {
                    output,
                    resume_at,
                    args: resume_args,
                } => {
                    self.record.bookmark(resume_at, resume_args);
                    self.record.awaiting = None;
                    self.record.track_jobs(cx.jobs());
                    self.persist().await?;
                    debug!(router = %self.record.key, resume_at = ?resume_at, "step yielded");
                    return Ok(Resolution::Advanced(output));
                }
                Outcome::Await {
                    mut worker,
                    next,
                    args: next_args,
                } => {
                    cx.track(worker.id());
                    worker.refresh().await?;

                    if worker.is_finished() {
                        info!(router = %self.record.key, job_id = %worker.id(), next = ?next, "worker finished, continuing");
                        self.record.bookmark(next, next_args.clone());
                        self.record.awaiting = None;
                        self.record.track_jobs(cx.jobs());
                        self.persist().await?;
                        step = next;
                        args = next_args;
                        continue;
                    }

                    self.record.bookmark(step, args);
                    self.record.awaiting = Some(worker.id());
                    self.record.track_jobs(cx.jobs());
                    self.persist().await?;
                    debug!(router = %self.record.key, step = ?step, job_id = %worker.id(), "parked on worker");

                    let placeholder = worker.invoke(current_location).await?;
                    return Ok(Resolution::Pending(placeholder));
                }
                Outcome::Done(output) => {
                    self.record.awaiting = None;
                    self.record.track_jobs(cx.jobs());
                    if self.policy.resets() {
                        self.reset_with_workers().await?;
                    } else {
                        self.persist().await?;
                    }
                    info!(router = %self.record.key, step = ?step, "router completed");
                    return Ok(Resolution::Completed(output));
                }
            }
        }

        warn!(router = %self.record.key, max_hops = self.max_hops, "step limit exceeded");
        Err(RouterError::StepLimitExceeded(self.max_hops))
    }

    /// Restore the initial step and arguments.
    ///
    /// Jobs are left alone; see [`Router::reset_with_workers`].
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn reset(&mut self) -> RouterResult<()> {
        self.record.restore_initial();
        self.persist().await?;
        info!(router = %self.record.key, "router reset");
        Ok(())
    }

    /// Reset every job used since the last reset, then the router itself.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn reset_with_workers(&mut self) -> RouterResult<()> {
        for id in self.record.jobs.clone() {
            match self.manager.worker_by_id(id).await {
                Ok(mut worker) => worker.reset().await?,
                Err(crate::jobs::JobError::NotFound(_)) => {
                    warn!(router = %self.record.key, job_id = %id, "tracked job no longer exists");
                }
                Err(err) => return Err(err.into()),
            }
        }
        self.reset().await
    }

    async fn persist(&self) -> RouterResult<()> {
        self.store.save(&self.record.encode()?).await?;
        Ok(())
    }
}

impl<R: Route> fmt::Debug for Router<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("record", &self.record)
            .field("policy", &self.policy)
            .field("max_hops", &self.max_hops)
            .finish_non_exhaustive()
    }
}
