//! Error types and error handling for the application
//!
//! This module defines custom error types that can be converted to HTTP responses.
//! All errors implement `IntoResponse` to provide consistent error formatting.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("graph invalid: {0}")]
    GraphInvalid(String),

    #[error("missing required input: {0}")]
    MissingInput(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("runner reported error: {0}")]
    RunnerReportedError(String),

    #[error("stale result for submission {0}")]
    StaleResult(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    StorageFailed(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::GraphInvalid(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::MissingInput(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::ValidationFailed(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::DispatchFailed(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::RunnerReportedError(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::StaleResult(_) => (StatusCode::CONFLICT, self.to_string()),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::StorageFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        tracing::error!(error = %error_message, status = %status, "request failed");

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
