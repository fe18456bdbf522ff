//! Unified gateway error type.
//!
//! Handlers return `Result<T, ServerError>`; the [`IntoResponse`] impl maps
//! each variant to a status code and a `{"detail": ...}` JSON body.
//! Internal failures are logged in full but reported generically.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use meetflow::errors::{MeetflowError, RegistryError, SubmitError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors surfaced by gateway handlers.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The caller referenced a task or artifact that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The request conflicts with the task's current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The upload exceeded the configured size limit.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// An unclassified internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::Conflict(m) => (StatusCode::CONFLICT, m),
            Self::PayloadTooLarge(m) => (StatusCode::PAYLOAD_TOO_LARGE, m),
            Self::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<SubmitError> for ServerError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Validation(m) => Self::BadRequest(m),
            too_large @ SubmitError::TooLarge { .. } => Self::PayloadTooLarge(too_large.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<RegistryError> for ServerError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound { id } => Self::NotFound(format!("task {id} not found")),
            conflict @ RegistryError::InvalidTransition { .. } => Self::Conflict(conflict.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<MeetflowError> for ServerError {
    fn from(err: MeetflowError) -> Self {
        match err {
            MeetflowError::Registry(e) => e.into(),
            MeetflowError::Submit(e) => e.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}
