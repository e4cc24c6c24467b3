use axum::{
    extract::multipart::MultipartError,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::error::ManagerError;

const BASIC_CHALLENGE: &str = "Basic realm=\"Authorization Required\"";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Authorization required")]
    Unauthorized,
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Engine error: {0}")]
    EngineError(String),
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Unauthorized => {
                return (
                    StatusCode::UNAUTHORIZED,
                    [(header::WWW_AUTHENTICATE, BASIC_CHALLENGE)],
                    Json(serde_json::json!({ "value": null, "error": "Authorization required" })),
                )
                    .into_response();
            }
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::EngineError(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::InternalServerError(msg) => {
                error!(error = %msg, "Request failed.");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (
            status,
            Json(serde_json::json!({ "value": null, "error": error_message })),
        )
            .into_response()
    }
}

impl From<ManagerError> for AppError {
    fn from(err: ManagerError) -> Self {
        let message = err.to_string();
        match err {
            ManagerError::Validation(_) => AppError::InvalidInput(message),
            ManagerError::AlreadyExists(_) => AppError::Conflict(message),
            ManagerError::NotFound(_) => AppError::NotFound(message),
            ManagerError::PathEscape(_) => AppError::Forbidden(message),
            ManagerError::Engine(_) => AppError::EngineError(message),
            ManagerError::Io(_)
            | ManagerError::Serialization(_)
            | ManagerError::PartialFailure { .. } => AppError::InternalServerError(message),
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::InvalidInput(format!("Invalid multipart form: {err}"))
    }
}
