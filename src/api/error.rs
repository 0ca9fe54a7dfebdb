//! API error types and conversions

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::{CheckError, MonitorError};

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    /// Storage operation failed
    StorageError(String),

    /// Invalid request parameters
    InvalidRequest(String),

    /// Resource not found
    NotFound(String),

    /// Record owned by another caller
    Forbidden(String),

    /// Request conflicts with current state (limit reached, check running)
    Conflict(String),

    /// An interactive check ran and failed
    CheckFailed {
        status: StatusCode,
        message: String,
        hint: String,
    },

    /// Scheduler is gone
    Unavailable(String),

    /// Internal server error
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::StorageError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg })),
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            ApiError::CheckFailed {
                status,
                message,
                hint,
            } => (status, json!({ "error": message, "hint": hint })),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": msg })),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg })),
        };

        (status, Json(body)).into_response()
    }
}

impl From<MonitorError> for ApiError {
    fn from(err: MonitorError) -> Self {
        let message = err.to_string();

        match err {
            MonitorError::NotFound(_) | MonitorError::NotificationNotFound(_) => {
                ApiError::NotFound(message)
            }
            MonitorError::Unauthorized(_) => ApiError::Forbidden(message),
            MonitorError::InvalidConfig(_) => ApiError::InvalidRequest(message),
            MonitorError::LimitReached(_) | MonitorError::AlreadyInProgress(_) => {
                ApiError::Conflict(message)
            }
            MonitorError::Check(check) => {
                let status = match check {
                    CheckError::Fetch(_) => StatusCode::BAD_GATEWAY,
                    CheckError::Extract(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    CheckError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                ApiError::CheckFailed {
                    status,
                    hint: check.user_hint(),
                    message,
                }
            }
            MonitorError::Storage(_) => ApiError::StorageError(message),
            MonitorError::SchedulerUnavailable => ApiError::Unavailable(message),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}
