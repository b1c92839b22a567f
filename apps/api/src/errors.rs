use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::documents::DocumentError;
use crate::pipeline::PipelineError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Storage error: {0}")]
    Storage(#[from] DocumentError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Pipeline(e) => pipeline_status(e),
            AppError::Storage(e) => {
                tracing::error!("Storage error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

fn pipeline_status(err: &PipelineError) -> (StatusCode, &'static str, String) {
    let message = err.to_string();
    match err {
        PipelineError::InvalidJobSpec(_) => (StatusCode::BAD_REQUEST, "INVALID_JOB_SPEC", message),
        PipelineError::Busy => (StatusCode::CONFLICT, "RUN_IN_PROGRESS", message),
        PipelineError::Cancelled => (StatusCode::CONFLICT, "CANCELLED", message),
        PipelineError::NoResults => (StatusCode::NOT_FOUND, "NO_RESULTS", message),
        PipelineError::Sourcing(_) | PipelineError::NoApplicants => {
            (StatusCode::UNPROCESSABLE_ENTITY, "SOURCING_FAILED", message)
        }
        PipelineError::Configuration(_) => {
            tracing::error!("Configuration error: {message}");
            (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR", message)
        }
    }
}
