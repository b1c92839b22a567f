//! Axum route handlers for the DocumentStore.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::info;

use crate::documents::naming::allowed_extension;
use crate::errors::AppError;
use crate::pipeline::PipelineError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub saved: Vec<String>,
    /// Files ignored because of their extension.
    pub skipped: Vec<String>,
}

/// POST /api/v1/documents
///
/// Multipart upload. Every file part is stored under its own name; parts
/// with unsupported extensions are reported back as skipped.
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    if state.pipeline.is_running() {
        return Err(PipelineError::Busy.into());
    }

    let mut saved = Vec::new();
    let mut skipped = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if allowed_extension(&file_name).is_none() {
            skipped.push(file_name);
            continue;
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("failed to read {file_name}: {e}")))?;
        state.pipeline.store().save(&file_name, &bytes).await?;
        saved.push(file_name);
    }

    if saved.is_empty() && skipped.is_empty() {
        return Err(AppError::Validation("request contained no files".to_string()));
    }

    info!(saved = saved.len(), skipped = skipped.len(), "documents uploaded");
    Ok(Json(UploadResponse { saved, skipped }))
}

/// DELETE /api/v1/documents
pub async fn handle_clear(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    if state.pipeline.is_running() {
        return Err(PipelineError::Busy.into());
    }
    state.pipeline.store().clear().await?;
    Ok(StatusCode::NO_CONTENT)
}
