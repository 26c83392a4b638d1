//! Request-boundary errors and their HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::github::UpstreamError;
use crate::theme::ThemeError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidParameter(String),

    #[error("Theme '{0}' not found.")]
    ThemeNotFound(String),

    #[error("upstream fetch failed: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("chart generation timed out")]
    GenerationTimeout,

    #[error("{0}")]
    Unexpected(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidParameter(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ThemeNotFound(_) => StatusCode::NOT_FOUND,
            AppError::GenerationTimeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::Upstream(_) | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ThemeError> for AppError {
    fn from(e: ThemeError) -> Self {
        match e {
            ThemeError::NotFound(name) => AppError::ThemeNotFound(name),
            other => AppError::Unexpected(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
