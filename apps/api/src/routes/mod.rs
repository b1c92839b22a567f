pub mod documents;
pub mod health;
pub mod runs;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Document store
        .route(
            "/api/v1/documents",
            post(documents::handle_upload).delete(documents::handle_clear),
        )
        // Runs
        .route("/api/v1/runs", post(runs::handle_start_run))
        .route("/api/v1/runs/cancel", post(runs::handle_cancel_run))
        .route("/api/v1/progress", get(runs::handle_progress))
        .route("/api/v1/report", get(runs::handle_report))
        .with_state(state)
}
