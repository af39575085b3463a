//! Error types and error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::jobs::JobError;
use crate::router::RouterError;

/// Framework error type
///
/// Wraps the job and router error families so request handlers can use `?`
/// on any acton-deferred operation and still produce an HTTP response.
#[derive(Debug, Error)]
pub enum DeferredError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Job lifecycle error
    #[error(transparent)]
    Job(#[from] JobError),

    /// Router error
    #[error(transparent)]
    Router(#[from] RouterError),

    /// Not Found (404)
    #[error("Not found: {0}")]
    NotFound(String),
}

impl DeferredError {
    /// HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_)
            | Self::Job(JobError::NotFound(_))
            | Self::Router(RouterError::Job(JobError::NotFound(_))) => StatusCode::NOT_FOUND,
            Self::Job(JobError::SubmissionFailed(_))
            | Self::Router(RouterError::Job(JobError::SubmissionFailed(_))) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DeferredError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}
