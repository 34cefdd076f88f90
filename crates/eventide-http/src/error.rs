//! HTTP error mapping.
//!
//! [`ApiError`] unifies the core, store, and dispatch failure modes into
//! HTTP responses: validation problems become 400s, missing resources
//! 404s, everything else a 500 with the error text.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use eventide_core::{CoreError, DispatchError};
use eventide_store::StoreError;

/// Errors surfaced by the HTTP endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request was malformed or named an unknown command type.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidCommand(_)
            | CoreError::UnregisteredCommand(_)
            | CoreError::Serialization(_) => Self::BadRequest(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CommandNotFound(_) | StoreError::SubscriptionNotFound(_) => {
                Self::NotFound(err.to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Invalid(core) => core.into(),
            DispatchError::Backend(message) => Self::Internal(message),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
