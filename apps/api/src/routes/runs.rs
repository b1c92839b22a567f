//! Axum route handlers for pipeline runs, progress, and the report.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{JobSpecification, Report};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::progress::NoopSink;
use crate::pipeline::{PipelineError, RecordSource, RunStatus};
use crate::state::{ActiveRun, AppState};

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StartRunRequest {
    #[serde(flatten)]
    pub source: RecordSource,
    /// Either the job specification object or a string holding its JSON.
    pub job_description: Value,
}

#[derive(Debug, Serialize)]
pub struct StartRunResponse {
    pub run_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub run_id: Option<Uuid>,
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub run_id: Option<Uuid>,
    #[serde(flatten)]
    pub status: RunStatus,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/runs
///
/// Validates the job specification, claims the run slot, and starts the run
/// in the background. Returns 202 with the run id, or 409 if a run is active.
pub async fn handle_start_run(
    State(state): State<AppState>,
    Json(request): Json<StartRunRequest>,
) -> Result<(StatusCode, Json<StartRunResponse>), AppError> {
    let job_json = match request.job_description {
        Value::String(raw) => raw,
        other => other.to_string(),
    };
    JobSpecification::from_json(&job_json).map_err(PipelineError::from)?;

    let permit = state.pipeline.try_acquire()?;

    let run_id = Uuid::new_v4();
    let cancel = CancelToken::new();
    state.set_active_run(Some(ActiveRun {
        id: run_id,
        cancel: cancel.clone(),
    }));

    let source = request.source;
    info!(%run_id, ?source, "run accepted");

    let task_state = state.clone();
    tokio::spawn(async move {
        let outcome = task_state
            .pipeline
            .run_with_permit(permit, &job_json, source, &cancel, Arc::new(NoopSink))
            .await;
        match outcome {
            Ok(results) => info!(%run_id, ranked = results.len(), "background run finished"),
            Err(e) => warn!(%run_id, error = %e, "background run ended without a new report"),
        }
        task_state.finish_run(run_id);
    });

    Ok((StatusCode::ACCEPTED, Json(StartRunResponse { run_id })))
}

/// POST /api/v1/runs/cancel
pub async fn handle_cancel_run(State(state): State<AppState>) -> Json<CancelResponse> {
    match state.active_run() {
        Some(run) => {
            run.cancel.cancel();
            info!(run_id = %run.id, "cancellation requested");
            Json(CancelResponse {
                run_id: Some(run.id),
                cancelled: true,
            })
        }
        None => Json(CancelResponse {
            run_id: None,
            cancelled: false,
        }),
    }
}

/// GET /api/v1/progress
pub async fn handle_progress(State(state): State<AppState>) -> Json<ProgressResponse> {
    Json(ProgressResponse {
        run_id: state.active_run().map(|r| r.id),
        status: state.pipeline.status(),
    })
}

/// GET /api/v1/report
///
/// The last completed run's report; 404 `NO_RESULTS` before any run completes.
pub async fn handle_report(State(state): State<AppState>) -> Result<Json<Report>, AppError> {
    Ok(Json(state.pipeline.report()?))
}
