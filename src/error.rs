//! Error types for the cache layer
//!
//! Cache operations themselves are infallible. `CacheError` covers the
//! configuration and admin surfaces, `FetchError` is the default error type
//! for injected fetch functions.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Errors raised while configuring the cache or serving admin requests.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A rule-table pattern failed validation
    #[error("Invalid rule for '{change_type}': pattern '{pattern}' {reason}")]
    InvalidRule {
        change_type: String,
        pattern: String,
        reason: String,
    },
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::InvalidRule { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;

// == Fetch Error ==
/// Failure of an injected fetch function.
///
/// Cheap to clone so a single failure can be shared by every caller waiting
/// on the same fetch and kept as a loader's last error.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    /// The backing source answered with an error
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// The backing source has no such record
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other failure
    #[error("{0}")]
    Other(Arc<anyhow::Error>),
}

impl From<anyhow::Error> for FetchError {
    fn from(err: anyhow::Error) -> Self {
        FetchError::Other(Arc::new(err))
    }
}
