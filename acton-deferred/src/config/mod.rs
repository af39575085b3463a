//! Configuration management for acton-deferred
//!
//! Configuration is loaded from multiple sources with clear precedence:
//!
//! 1. Environment variables (highest priority, `ACTON_DEFERRED_` prefix,
//!    `__` separates nested keys)
//! 2. An explicit file passed to [`DeferredConfig::load_from`]
//! 3. `./deferred.toml`
//! 4. Hardcoded defaults (fallback)
//!
//! # Example Configuration
//!
//! ```toml
//! # deferred.toml
//! [worker]
//! finished_policy = "require_reset"
//! queued_expiry_secs = 600
//!
//! [router]
//! terminal_policy = "reset"
//!
//! [queue]
//! redis_url = "redis://127.0.0.1:6379"
//! queue_name = "deferred:queue"
//!
//! [database]
//! url = "postgres://localhost/deferred"
//! max_connections = 10
//!
//! [placeholder]
//! status_endpoint = "/_check_job_status"
//! poll_interval_ms = 1000
//! loading_img_src = "/static/loading.gif"
//! ```
//!
//! Environment overrides use the same nesting:
//! `ACTON_DEFERRED_QUEUE__REDIS_URL=redis://queue:6379`.
//!
//! # Usage
//!
//! ```rust,no_run
//! use acton_deferred::config::DeferredConfig;
//!
//! # fn example() -> Result<(), acton_deferred::error::DeferredError> {
//! let config = DeferredConfig::load()?;
//! let expiry = config.worker.queued_expiry_secs;
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::DeferredError;
use crate::jobs::{PlaceholderSettings, WorkerSettings};
use crate::resolution::TerminalPolicy;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "deferred.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "ACTON_DEFERRED_";

/// Router behavior
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// What happens once a router's terminal step returns
    pub terminal_policy: TerminalPolicy,
}

/// Executor queue configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Redis URL; when unset the in-process executor is used
    pub redis_url: Option<String>,

    /// Redis list holding task envelopes
    pub queue_name: String,

    /// Number of tasks draining the in-process queue
    pub local_concurrency: usize,

    /// How long submission statuses are kept, in seconds
    pub status_ttl_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            queue_name: "deferred:queue".to_string(),
            local_concurrency: 4,
            status_ttl_secs: 604_800, // 7 days
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `PostgreSQL` URL; when unset records are kept in memory
    pub url: Option<String>,

    /// Maximum pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

/// Complete acton-deferred configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredConfig {
    /// Worker settings
    #[serde(default)]
    pub worker: WorkerSettings,

    /// Router settings
    #[serde(default)]
    pub router: RouterSettings,

    /// Executor queue settings
    #[serde(default)]
    pub queue: QueueConfig,

    /// Database settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Placeholder settings
    #[serde(default)]
    pub placeholder: PlaceholderSettings,
}

impl DeferredConfig {
    /// Load configuration from `./deferred.toml` and the environment
    ///
    /// A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`DeferredError::Config`] if a source holds invalid values.
    pub fn load() -> Result<Self, DeferredError> {
        Self::extract(Self::base())
    }

    /// Load configuration with `path` layered over `./deferred.toml`
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use acton_deferred::config::DeferredConfig;
    ///
    /// # fn example() -> Result<(), acton_deferred::error::DeferredError> {
    /// let config = DeferredConfig::load_from("./config/production.toml")?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`DeferredError::Config`] if `path` does not exist or a
    /// source holds invalid values.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, DeferredError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DeferredError::Config(format!(
                "configuration file {} not found",
                path.display()
            )));
        }
        Self::extract(Self::base().merge(Toml::file(path)))
    }

    fn base() -> Figment {
        Figment::from(Serialized::defaults(Self::default())).merge(Toml::file(DEFAULT_CONFIG_FILE))
    }

    fn extract(figment: Figment) -> Result<Self, DeferredError> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| DeferredError::Config(e.to_string()))
    }
}
