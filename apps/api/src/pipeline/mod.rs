//! Pipeline — one end-to-end ranking run.
//!
//! ```text
//! Init → SourceLoaded → Evaluating → Ranked → Done
//!          │               │
//!          └──── Cancelled ┘        (any state) → Failed
//! ```
//!
//! Evaluations run sequentially with a fixed spacing between calls. A
//! rate-limited evaluation is retried with a fixed backoff; any other
//! evaluation error skips that applicant. Only configuration and sourcing
//! errors fail the run.
//!
//! All shared state (job spec, result snapshot, latest progress, phase) sits
//! behind one `RwLock`. The snapshot is replaced in a single write at `Done`.

pub mod cancel;
pub mod progress;
pub mod retry;

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::documents::DocumentStore;
use crate::evaluation::{EvaluationError, Evaluator};
use crate::mailbox::client::MailboxClient;
use crate::mailbox::{subject_query, MailboxError, RemoteSource};
use crate::models::{ApplicantRecord, JobSpecError, JobSpecification, RankedResult, Report};
use crate::ranking::rank;

use self::cancel::CancelToken;
use self::progress::{Monotonic, ProgressSink, ProgressUpdate, Scaled};
use self::retry::{retry_with_backoff, Backoff, RetryError, RetryPolicy};

// ────────────────────────────────────────────────────────────────────────────
// Settings, phases, errors
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Minimum spacing between consecutive evaluator calls.
    pub evaluation_delay: Duration,
    /// Applied to rate-limited evaluations only.
    pub rate_limit_retry: RetryPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            evaluation_delay: Duration::from_secs(4),
            rate_limit_retry: RetryPolicy {
                max_attempts: 3,
                backoff: Backoff::Fixed(Duration::from_secs(10)),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// No run has started yet.
    Idle,
    Init,
    SourceLoaded,
    Evaluating,
    Ranked,
    Done,
    Cancelled,
    Failed,
}

/// Where a run gets its applicant records from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum RecordSource {
    /// Whatever is already in the DocumentStore.
    Upload,
    /// Clear the store, then fetch attachments of messages with this subject.
    Mailbox { subject: String },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid job specification: {0}")]
    InvalidJobSpec(#[from] JobSpecError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("sourcing failed: {0}")]
    Sourcing(String),

    #[error("no applicants with a readable CV were found")]
    NoApplicants,

    #[error("run cancelled")]
    Cancelled,

    #[error("a run is already in progress")]
    Busy,

    #[error("no results available; complete a run first")]
    NoResults,
}

impl From<MailboxError> for PipelineError {
    fn from(err: MailboxError) -> Self {
        match err {
            MailboxError::Cancelled => PipelineError::Cancelled,
            MailboxError::Unauthorized { status } => PipelineError::Configuration(format!(
                "mailbox rejected the credentials (HTTP {status})"
            )),
            other => PipelineError::Sourcing(other.to_string()),
        }
    }
}

/// Snapshot of the run for pollers.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub phase: RunPhase,
    pub running: bool,
    pub progress: Option<ProgressUpdate>,
}

/// Proof that the caller holds the single run slot. Dropping it frees the slot.
pub struct RunPermit {
    _guard: OwnedMutexGuard<()>,
}

// ────────────────────────────────────────────────────────────────────────────
// Shared state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct RunState {
    phase: RunPhase,
    job: Option<JobSpecification>,
    snapshot: Option<Report>,
    progress: Option<ProgressUpdate>,
}

type SharedState = Arc<RwLock<RunState>>;

fn read(state: &SharedState) -> RwLockReadGuard<'_, RunState> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(state: &SharedState) -> RwLockWriteGuard<'_, RunState> {
    state.write().unwrap_or_else(PoisonError::into_inner)
}

/// Records the latest update in shared state, then forwards it.
struct PublishingSink {
    state: SharedState,
    downstream: Arc<dyn ProgressSink>,
}

impl ProgressSink for PublishingSink {
    fn report(&self, update: ProgressUpdate) {
        write(&self.state).progress = Some(update.clone());
        self.downstream.report(update);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

pub struct Pipeline {
    store: DocumentStore,
    evaluator: Arc<dyn Evaluator>,
    mailbox: Option<Arc<dyn MailboxClient>>,
    settings: PipelineSettings,
    run_slot: Arc<Mutex<()>>,
    state: SharedState,
}

impl Pipeline {
    pub fn new(store: DocumentStore, evaluator: Arc<dyn Evaluator>, settings: PipelineSettings) -> Self {
        Self {
            store,
            evaluator,
            mailbox: None,
            settings,
            run_slot: Arc::new(Mutex::new(())),
            state: Arc::new(RwLock::new(RunState {
                phase: RunPhase::Idle,
                job: None,
                snapshot: None,
                progress: None,
            })),
        }
    }

    /// Enables `RecordSource::Mailbox`.
    pub fn with_mailbox(mut self, client: Arc<dyn MailboxClient>) -> Self {
        self.mailbox = Some(client);
        self
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Claims the run slot without waiting. Fails with `Busy` if a run holds it.
    pub fn try_acquire(&self) -> Result<RunPermit, PipelineError> {
        let guard = self
            .run_slot
            .clone()
            .try_lock_owned()
            .map_err(|_| PipelineError::Busy)?;
        Ok(RunPermit { _guard: guard })
    }

    pub fn is_running(&self) -> bool {
        self.run_slot.try_lock().is_err()
    }

    /// Runs the whole pipeline. Rejects with `Busy` while another run is active.
    pub async fn run(
        &self,
        job_json: &str,
        source: RecordSource,
        cancel: &CancelToken,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<Vec<RankedResult>, PipelineError> {
        let permit = self.try_acquire()?;
        self.run_with_permit(permit, job_json, source, cancel, progress)
            .await
    }

    /// Same as `run`, for callers that claimed the slot up front.
    pub async fn run_with_permit(
        &self,
        _permit: RunPermit,
        job_json: &str,
        source: RecordSource,
        cancel: &CancelToken,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<Vec<RankedResult>, PipelineError> {
        {
            let mut state = write(&self.state);
            state.phase = RunPhase::Init;
            state.progress = None;
        }

        let sink: Arc<dyn ProgressSink> = Arc::new(Monotonic::new(Arc::new(PublishingSink {
            state: self.state.clone(),
            downstream: progress,
        })));

        let outcome = self.execute(job_json, source, cancel, sink).await;

        match &outcome {
            Ok(results) => info!(ranked = results.len(), "run complete"),
            Err(PipelineError::Cancelled) => {
                self.set_phase(RunPhase::Cancelled);
                info!("run cancelled");
            }
            Err(e) => {
                self.set_phase(RunPhase::Failed);
                warn!(error = %e, "run failed");
            }
        }
        outcome
    }

    async fn execute(
        &self,
        job_json: &str,
        source: RecordSource,
        cancel: &CancelToken,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Vec<RankedResult>, PipelineError> {
        let job = JobSpecification::from_json(job_json)?;
        info!(job_title = %job.title, ?source, "starting run");

        let (records, band) = self.load_records(&source, cancel, sink.clone()).await?;
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if records.is_empty() {
            return Err(PipelineError::NoApplicants);
        }
        self.set_phase(RunPhase::SourceLoaded);
        sink.report(ProgressUpdate::percent(
            band.0,
            format!("Processing {} applicants...", records.len()),
        ));

        self.set_phase(RunPhase::Evaluating);
        let evaluated = self
            .evaluate_all(&records, &job, cancel, Scaled::new(sink.clone(), band.0, band.1))
            .await?;

        sink.report(ProgressUpdate::percent(95, "Ranking candidates..."));
        let ranked = rank(evaluated);
        self.set_phase(RunPhase::Ranked);

        let report = Report {
            applicants: ranked.clone(),
            job_title: job.title.clone(),
            timestamp: Utc::now(),
        };
        {
            let mut state = write(&self.state);
            state.job = Some(job);
            state.snapshot = Some(report);
            state.phase = RunPhase::Done;
        }
        sink.report(ProgressUpdate::percent(100, "Processing complete!"));

        Ok(ranked)
    }

    /// Returns the records and the percentage band left for evaluation.
    async fn load_records(
        &self,
        source: &RecordSource,
        cancel: &CancelToken,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<(Vec<ApplicantRecord>, (u32, u32)), PipelineError> {
        let (loading_at, evaluation_band) = match source {
            RecordSource::Upload => {
                sink.report(ProgressUpdate::percent(0, "Loading uploaded documents..."));
                (10, (20, 95))
            }
            RecordSource::Mailbox { subject } => {
                let client = self.mailbox.clone().ok_or_else(|| {
                    PipelineError::Configuration("mailbox sourcing is not configured".to_string())
                })?;

                sink.report(ProgressUpdate::percent(0, "Connecting to mailbox..."));
                let remote = RemoteSource::connect(client, self.store.clone()).await?;

                self.store
                    .clear()
                    .await
                    .map_err(|e| PipelineError::Sourcing(e.to_string()))?;

                let summary = remote
                    .fetch(&subject_query(subject), cancel, Arc::new(Scaled::new(sink.clone(), 0, 40)))
                    .await?;
                info!(?summary, "mailbox fetch finished");
                (50, (60, 95))
            }
        };

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        sink.report(ProgressUpdate::percent(loading_at, "Loading documents..."));
        let records = self
            .store
            .list_records()
            .await
            .map_err(|e| PipelineError::Sourcing(e.to_string()))?;
        info!(applicants = records.len(), "applicant records loaded");

        Ok((records, evaluation_band))
    }

    async fn evaluate_all(
        &self,
        records: &[ApplicantRecord],
        job: &JobSpecification,
        cancel: &CancelToken,
        progress: Scaled,
    ) -> Result<Vec<RankedResult>, PipelineError> {
        let total = u32::try_from(records.len()).unwrap_or(u32::MAX);
        let mut results = Vec::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            if index > 0 && !cancel.sleep(self.settings.evaluation_delay).await {
                return Err(PipelineError::Cancelled);
            }

            let current = u32::try_from(index).unwrap_or(u32::MAX);
            progress.report(ProgressUpdate {
                current,
                total,
                message: format!("Evaluating {} ({}/{})", record.name, index + 1, records.len()),
            });

            let outcome = retry_with_backoff(
                self.settings.rate_limit_retry,
                cancel,
                EvaluationError::is_rate_limited,
                |attempt, delay, _| {
                    progress.report(ProgressUpdate {
                        current,
                        total,
                        message: format!(
                            "Rate limit - retrying {} in {}s (attempt {attempt})",
                            record.name,
                            delay.as_secs()
                        ),
                    });
                },
                |_| self.evaluator.evaluate(record, job, cancel),
            )
            .await;

            match outcome {
                Ok(score) => {
                    info!(
                        applicant = %record.name,
                        total = score.total_score,
                        experience = score.experience_score,
                        education = score.education_score,
                        duties = score.duties_score,
                        cover_letter = score.cover_letter_score,
                        "applicant scored"
                    );
                    results.push(RankedResult {
                        name: record.name.clone(),
                        scores: score,
                        rank: 0,
                        cv_path: Some(record.cv_path.clone()),
                        cover_letter_path: record.cover_letter_path.clone(),
                    });
                }
                Err(RetryError::Cancelled) | Err(RetryError::Fatal(EvaluationError::Cancelled)) => {
                    return Err(PipelineError::Cancelled);
                }
                Err(e) => {
                    warn!(applicant = %record.name, error = %e, "skipping applicant");
                }
            }
        }

        Ok(results)
    }

    fn set_phase(&self, phase: RunPhase) {
        write(&self.state).phase = phase;
    }

    /// The last completed run's report, or `NoResults` before any run has
    /// completed.
    pub fn report(&self) -> Result<Report, PipelineError> {
        read(&self.state).snapshot.clone().ok_or(PipelineError::NoResults)
    }

    /// Job specification of the last completed run.
    pub fn job(&self) -> Option<JobSpecification> {
        read(&self.state).job.clone()
    }

    pub fn status(&self) -> RunStatus {
        let state = read(&self.state);
        RunStatus {
            phase: state.phase,
            running: self.is_running(),
            progress: state.progress.clone(),
        }
    }
}
