//! HTTP route handlers.

pub mod health;
pub mod jobs;
pub mod trucks;
pub mod usage;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Handler-level error that renders as a JSON problem body.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<pipeline::StoreError> for ApiError {
    fn from(error: pipeline::StoreError) -> Self {
        match error {
            pipeline::StoreError::NotFound { id } => ApiError::NotFound(format!("not found: {id}")),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
