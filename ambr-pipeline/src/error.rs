//! Error types for ambr-pipeline
//!
//! Upstream capability errors are split into transient (retried with
//! backoff) and permanent (recorded and skipped). HTTP handlers convert
//! everything into [`ApiError`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::utils::retry::Transient;

/// Content-analysis capability errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("Rate limited by analysis capability")]
    RateLimited,

    /// Malformed response or missing required fields
    #[error("Invalid analysis response: {0}")]
    InvalidResponse(String),

    #[error("Analysis capability unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Analysis call timed out")]
    Timeout,
}

impl Transient for AnalysisError {
    fn is_transient(&self) -> bool {
        !matches!(self, AnalysisError::InvalidResponse(_))
    }
}

/// Audio-synthesis and asset persistence errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("Rate limited by synthesis capability")]
    RateLimited,

    #[error("Generation timed out")]
    Timeout,

    #[error("Synthesis capability unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Prompt refused (policy filter, invalid parameters)
    #[error("Generation rejected: {0}")]
    UpstreamRejected(String),

    #[error("Invalid synthesis response: {0}")]
    InvalidResponse(String),

    #[error("Asset storage failed: {0}")]
    Storage(String),

    #[error("Generation cancelled")]
    Cancelled,
}

impl Transient for GenerationError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            GenerationError::RateLimited
                | GenerationError::Timeout
                | GenerationError::UpstreamUnavailable(_)
        )
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. reprocessing a book that is still running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Work could not be queued (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Common(#[from] ambr_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(err) => match err {
                ambr_common::Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
                ambr_common::Error::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg)
                }
                ambr_common::Error::Storage(msg) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", msg)
                }
                other => {
                    tracing::error!(error = %other, "Request failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        other.to_string(),
                    )
                }
            },
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
