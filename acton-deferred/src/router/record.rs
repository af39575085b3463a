//! Durable router state.

use super::{RouterError, RouterResult, StepArgs};
use crate::jobs::JobId;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Router state with typed steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterRecord<S> {
    /// Caller-chosen router name.
    pub key: String,
    /// Step the next `advance` starts at.
    pub current_step: S,
    /// Arguments for the current step.
    pub args: StepArgs,
    /// Step restored by `reset`.
    pub initial_step: S,
    /// Arguments restored by `reset`.
    pub initial_args: StepArgs,
    /// Job the router is parked on, if any.
    pub awaiting: Option<JobId>,
    /// Jobs used since the last reset.
    pub jobs: Vec<JobId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl<S> RouterRecord<S>
where
    S: Copy + Serialize + DeserializeOwned,
{
    /// Create a record positioned at `step`.
    #[must_use]
    pub fn new(key: impl Into<String>, step: S, args: StepArgs) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            current_step: step,
            args: args.clone(),
            initial_step: step,
            initial_args: args,
            awaiting: None,
            jobs: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Make `step` with `args` the resume point.
    pub fn bookmark(&mut self, step: S, args: StepArgs) {
        self.current_step = step;
        self.args = args;
    }

    /// Restore the initial snapshot and forget awaited and used jobs.
    pub fn restore_initial(&mut self) {
        self.current_step = self.initial_step;
        self.args = self.initial_args.clone();
        self.awaiting = None;
        self.jobs.clear();
    }

    /// Add jobs to the used-jobs list, keeping it free of duplicates.
    pub fn track_jobs(&mut self, ids: &[JobId]) {
        for id in ids {
            if !self.jobs.contains(id) {
                self.jobs.push(*id);
            }
        }
    }

    /// Decode a stored record.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::StaleResume`] if a stored step does not name a
    /// step of `S`.
    pub fn decode(stored: StoredRouter) -> RouterResult<Self> {
        let decode_step = |value: Value| {
            serde_json::from_value::<S>(value.clone()).map_err(|e| {
                RouterError::StaleResume(format!(
                    "router {} has unknown step {value}: {e}",
                    stored.key
                ))
            })
        };
        let current_step = decode_step(stored.current_step.clone())?;
        let initial_step = decode_step(stored.initial_step.clone())?;

        Ok(Self {
            current_step,
            initial_step,
            key: stored.key,
            args: stored.args,
            initial_args: stored.initial_args,
            awaiting: stored.awaiting,
            jobs: stored.jobs,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        })
    }

    /// Encode for storage.
    ///
    /// # Errors
    ///
    /// Returns an error if a step cannot be serialized.
    pub fn encode(&self) -> RouterResult<StoredRouter> {
        Ok(StoredRouter {
            key: self.key.clone(),
            current_step: serde_json::to_value(self.current_step)?,
            args: self.args.clone(),
            initial_step: serde_json::to_value(self.initial_step)?,
            initial_args: self.initial_args.clone(),
            awaiting: self.awaiting,
            jobs: self.jobs.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Router state as persisted, with steps as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRouter {
    /// Caller-chosen router name.
    pub key: String,
    /// Current step.
    pub current_step: Value,
    /// Arguments for the current step.
    pub args: StepArgs,
    /// Initial step.
    pub initial_step: Value,
    /// Initial arguments.
    pub initial_args: StepArgs,
    /// Job the router is parked on, if any.
    pub awaiting: Option<JobId>,
    /// Jobs used since the last reset.
    pub jobs: Vec<JobId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}
