//! Observability (logging, tracing)
//!
//! Structured logging for the request side and the executor process. Every
//! job and router state transition is logged with `job_id`/`key` fields, so
//! a single filter such as `RUST_LOG=acton_deferred=debug` follows a job from
//! enqueue to notification.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize observability stack
///
/// Sets up:
/// - Structured logging with JSON formatting (production) or pretty formatting (dev)
/// - Environment-based log level filtering (`RUST_LOG`)
///
/// # Example
///
/// ```rust,no_run
/// use acton_deferred::observability::{self, ObservabilityConfig};
///
/// # fn main() -> anyhow::Result<()> {
/// observability::init(&ObservabilityConfig::new("my-app"))?;
/// tracing::info!("Application started");
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init(config: &ObservabilityConfig) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter());

    if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()?;
    }

    tracing::debug!(service = %config.service_name, json = config.json, "observability initialized");
    Ok(())
}

/// Like [`init`], but ignores an already-installed subscriber.
///
/// Useful in tests and demos that may initialize more than once.
pub fn try_init(config: &ObservabilityConfig) {
    let _ = init(config);
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("debug,acton_deferred=trace")
        } else {
            EnvFilter::new("info")
        }
    })
}

/// Observability configuration
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Service name recorded at startup
    pub service_name: String,

    /// Emit JSON lines instead of pretty output
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "acton-deferred".to_string(),
            json: !cfg!(debug_assertions),
        }
    }
}

impl ObservabilityConfig {
    /// Create new observability config
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Choose JSON or pretty output
    #[must_use]
    pub const fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}
