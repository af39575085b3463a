//! HTTP handlers for deferred jobs
//!
//! Provides the status-check endpoint that placeholders poll, and the
//! response conversions that let request handlers return a [`Placeholder`]
//! or a [`Resolution`] directly.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use acton_deferred::bridge::LocalExecutor;
//! use acton_deferred::handlers;
//! use acton_deferred::jobs::WorkerManager;
//! use acton_deferred::store::MemoryStore;
//! use std::sync::Arc;
//!
//! # fn example(executor: LocalExecutor) {
//! let manager = WorkerManager::new(Arc::new(MemoryStore::new()), Arc::new(executor));
//! let app: axum::Router = axum::Router::new().merge(handlers::status_routes(manager));
//! # }
//! ```

use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json,
};
use axum_htmx::HxResponseTrigger;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bridge::ExecutionStatus;
use crate::error::DeferredError;
use crate::jobs::{Placeholder, TrackingId, WorkerManager};
use crate::resolution::Resolution;

/// Event sent in the `HX-Trigger` header of every placeholder response.
pub const JOB_PENDING_EVENT: &str = "job_pending";

/// Query string of the status-check endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct StatusQuery {
    /// Tracking id of the submission to check
    pub job_id: String,
}

/// Response for the status-check endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Whether the submission has finished
    pub job_finished: bool,
    /// Raw executor status
    pub status: ExecutionStatus,
}

/// Report whether a submission has finished.
///
/// Clients that missed the `job_finished` notification poll this endpoint.
/// A tracking id the executor no longer knows reports `job_finished: false`.
///
/// # Errors
///
/// Returns an error response if the executor cannot be reached.
pub async fn check_job_status(
    State(manager): State<WorkerManager>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>, DeferredError> {
    let tracking_id = TrackingId::from(query.job_id);
    let status = manager.check_status(&tracking_id).await?;
    debug!(tracking_id = %tracking_id, status = %status, "job status checked");

    Ok(Json(StatusResponse {
        job_finished: status.is_done(),
        status,
    }))
}

/// Router serving [`check_job_status`] at the configured status endpoint.
pub fn status_routes<S>(manager: WorkerManager) -> axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let endpoint = manager.placeholder_settings().status_endpoint.clone();
    axum::Router::new()
        .route(&endpoint, get(check_job_status))
        .with_state(manager)
}

impl IntoResponse for Placeholder {
    fn into_response(self) -> Response {
        match self.render_html() {
            Ok(html) => (HxResponseTrigger::normal([JOB_PENDING_EVENT]), Html(html)).into_response(),
            Err(e) => DeferredError::from(e).into_response(),
        }
    }
}

impl<O: IntoResponse> IntoResponse for Resolution<O> {
    fn into_response(self) -> Response {
        match self {
            Self::Pending(placeholder) => placeholder.into_response(),
            Self::Advanced(output) | Self::Completed(output) => output.into_response(),
        }
    }
}
