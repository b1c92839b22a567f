use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

use crate::pipeline::cancel::CancelToken;
use crate::pipeline::Pipeline;

/// The run started through the API, with the cancel token the API owns for it.
#[derive(Debug, Clone)]
pub struct ActiveRun {
    pub id: Uuid,
    pub cancel: CancelToken,
}

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    active_run: Arc<Mutex<Option<ActiveRun>>>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            active_run: Arc::new(Mutex::new(None)),
        }
    }

    pub fn active_run(&self) -> Option<ActiveRun> {
        self.active_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_active_run(&self, run: Option<ActiveRun>) {
        *self.active_run.lock().unwrap_or_else(PoisonError::into_inner) = run;
    }

    /// Clears the active run only if it is still `id`.
    pub fn finish_run(&self, id: Uuid) {
        let mut active = self.active_run.lock().unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().map(|r| r.id) == Some(id) {
            *active = None;
        }
    }
}
