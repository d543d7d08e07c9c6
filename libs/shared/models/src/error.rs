use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Top-level error every handler returns. Expected business conflicts are
/// handled as structured non-success bodies before reaching this type; what
/// lands here maps straight onto an HTTP status.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing, invalid, or insufficient credentials for the record.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Absent or soft-deleted record.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Malformed amounts, missing required fields.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A conditional write matched nothing because another writer got there
    /// first.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("External service error: {0}")]
    ExternalService(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) | AppError::ValidationError(msg) => {
                (StatusCode::BAD_REQUEST, msg)
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Database(msg) | AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            AppError::ExternalService(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        tracing::error!("Request failed with {}: {}", status, message);

        (status, Json(json!({ "error": message }))).into_response()
    }
}
