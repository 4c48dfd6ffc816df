//! [`CoordinatorError`]: the Coordinator's leaf error type, with an
//! `IntoResponse` impl so handlers can `?`-propagate straight into the status
//! codes §6 specifies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("missing or invalid authorization")]
    AuthFailure,
    #[error("malformed request body: {0}")]
    Malformed(String),
    #[error("task queue is full")]
    QueueFull,
}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            CoordinatorError::AuthFailure => (StatusCode::UNAUTHORIZED, self.to_string()),
            CoordinatorError::Malformed(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            CoordinatorError::QueueFull => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
