//! Evaluation — scores one applicant record against a job specification.
//!
//! `Evaluator` is the seam the pipeline depends on. The production
//! `LlmEvaluator` builds a bounded request, sends it through the
//! `TextCompletion` boundary, and decodes the reply into a `Score`.
//!
//! The pipeline holds an `Arc<dyn Evaluator>`; tests substitute scripted fakes.

pub mod decode;
pub mod request;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm_client::{LlmError, TextCompletion};
use crate::models::{ApplicantRecord, JobSpecification, Score};
use crate::pipeline::cancel::CancelToken;

use self::decode::{decode_score, DecodeError};
use self::request::build_request;

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("evaluator call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("could not decode evaluator response: {0}")]
    Decode(#[from] DecodeError),

    #[error("evaluation cancelled")]
    Cancelled,
}

impl EvaluationError {
    /// Only transport/API failures can be throttling; a malformed reply never is.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            EvaluationError::Llm(e) => e.is_rate_limited(),
            EvaluationError::Decode(_) | EvaluationError::Cancelled => false,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        record: &ApplicantRecord,
        job: &JobSpecification,
        cancel: &CancelToken,
    ) -> Result<Score, EvaluationError>;
}

// ────────────────────────────────────────────────────────────────────────────
// LlmEvaluator — production implementation
// ────────────────────────────────────────────────────────────────────────────

pub struct LlmEvaluator {
    backend: Arc<dyn TextCompletion>,
}

impl LlmEvaluator {
    pub fn new(backend: Arc<dyn TextCompletion>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Evaluator for LlmEvaluator {
    async fn evaluate(
        &self,
        record: &ApplicantRecord,
        job: &JobSpecification,
        cancel: &CancelToken,
    ) -> Result<Score, EvaluationError> {
        if cancel.is_cancelled() {
            return Err(EvaluationError::Cancelled);
        }

        let request = build_request(record, job);
        debug!(
            applicant = %record.name,
            cv_bytes = record.cv_text.len(),
            prompt_bytes = request.prompt.len(),
            "sending evaluation request"
        );

        let response = tokio::select! {
            result = self.backend.complete(&request.prompt, request.system) => result?,
            _ = cancel.cancelled() => return Err(EvaluationError::Cancelled),
        };

        let score = decode_score(&response)?;
        if score.is_out_of_range() {
            warn!(applicant = %record.name, ?score, "evaluator returned out-of-range sub-scores, clamping");
        }

        Ok(score.normalized())
    }
}
