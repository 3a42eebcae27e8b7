//! API error types and their HTTP mapping.
//!
//! Domain rejections from the state machine surface with their stable
//! code and a 4xx status; infrastructure failures collapse to a generic
//! 500 without leaking internals.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use punchclock_domain::TimeclockError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code (`already_open`, `not_clocked_in`, ...)
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Timeclock(#[from] TimeclockError),

    #[error("missing X-User-Id header")]
    MissingUserHeader,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Timeclock(err) if err.is_domain() => {
                tracing::warn!(code = err.code(), error = %err, "command rejected");
                (domain_status(err), ErrorResponse::new(err.code(), err.to_string()))
            }
            Self::Timeclock(err) => {
                tracing::error!(code = err.code(), error = %err, "infrastructure failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new(err.code(), "internal error"),
                )
            }
            Self::MissingUserHeader => {
                tracing::warn!("request without X-User-Id header");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::new("missing_user", self.to_string()),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

fn domain_status(err: &TimeclockError) -> StatusCode {
    match err {
        TimeclockError::InvalidTask(_) | TimeclockError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::CONFLICT,
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
