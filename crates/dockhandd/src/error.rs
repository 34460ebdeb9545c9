use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dockhand_core::ValidationError;
use dockhand_jobs::JobError;
use serde_json::json;
use thiserror::Error;

/// Everything a request can fail with, rendered as `{"error": ...}`.
/// Validation failures also carry `"field"`, the input they are about.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("malformed multipart request: {0}")]
    Multipart(String),

    #[error(transparent)]
    Job(#[from] JobError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(ValidationError::NotADockerfile { .. }) => StatusCode::IM_A_TEAPOT,
            ApiError::Validation(_) | ApiError::Multipart(_) => StatusCode::BAD_REQUEST,
            ApiError::Job(JobError::UnknownJob(_)) => StatusCode::NOT_FOUND,
            ApiError::Job(JobError::QueueFull { .. } | JobError::Closed) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Job(JobError::InvalidTransition { .. } | JobError::Store(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        let body = match &self {
            ApiError::Validation(error) => json!({
                "error": self.to_string(),
                "field": error.subject(),
            }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
