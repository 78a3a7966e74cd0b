use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::parsing::{ParseError, Stage};

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Uploaded file exceeds the {limit_mb} MB limit")]
    PayloadTooLarge { limit_mb: usize },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Parse(e) => match e {
                ParseError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                ParseError::CorruptDocument { .. } | ParseError::EmptyDocument { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                ParseError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                ParseError::UpstreamUnavailable(_)
                | ParseError::UpstreamRejected { .. }
                | ParseError::MalformedOutput(_)
                | ParseError::SchemaViolation { .. } => StatusCode::BAD_GATEWAY,
            },
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, stage, message): (&str, Option<Stage>, String) = match &self {
            AppError::Parse(e) => {
                if status.is_server_error() {
                    tracing::error!(code = e.code(), "Parse failed: {e}");
                } else {
                    tracing::warn!(code = e.code(), "Parse rejected: {e}");
                }
                (e.code(), Some(e.stage()), e.to_string())
            }
            AppError::Validation(msg) => ("VALIDATION_ERROR", None, msg.clone()),
            AppError::PayloadTooLarge { .. } => ("PAYLOAD_TOO_LARGE", None, self.to_string()),
            AppError::Unauthorized => (
                "UNAUTHORIZED",
                None,
                "Authentication required".to_string(),
            ),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    "INTERNAL_ERROR",
                    None,
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "stage": stage,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
