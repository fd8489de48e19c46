//! HTTP-facing error taxonomy.
//!
//! Row-level failures (coordinate parse errors, CRS transforms out of
//! range, daemon timeouts, ...) never reach this type — they are
//! recorded as `RouteOutcome::Failed` values and folded into a job's
//! `failed` counter. This enum only covers what the boundary handlers
//! (C9) can return to an HTTP caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Precondition(String),

    #[error("job failed: {0}")]
    JobFatal(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Precondition(_) => StatusCode::BAD_REQUEST,
            ApiError::JobFatal(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) | ApiError::Io(_) => {
                tracing::error!(error = %self, "server_fatal");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ErrorBody {
            success: false,
            error: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
