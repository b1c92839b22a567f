//! Progress reporting for long-running runs.
//!
//! Delivery contract: every update is delivered at least once, on whatever
//! task produced it, and `current` never decreases for a given `Monotonic`
//! wrapper. Subscribers must not assume they run on any particular thread.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// One `(current, total, message)` progress triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub current: u32,
    pub total: u32,
    pub message: String,
}

impl ProgressUpdate {
    pub fn percent(current: u32, message: impl Into<String>) -> Self {
        Self {
            current: current.min(100),
            total: 100,
            message: message.into(),
        }
    }
}

/// Observer for progress updates.
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        self(update)
    }
}

/// Channel-backed sink. A closed receiver is ignored.
impl ProgressSink for UnboundedSender<ProgressUpdate> {
    fn report(&self, update: ProgressUpdate) {
        let _ = self.send(update);
    }
}

/// Drops every update.
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn report(&self, _update: ProgressUpdate) {}
}

/// Clamps `current` so it never regresses below the highest value seen.
pub struct Monotonic {
    inner: Arc<dyn ProgressSink>,
    high_water: AtomicU32,
}

impl Monotonic {
    pub fn new(inner: Arc<dyn ProgressSink>) -> Self {
        Self {
            inner,
            high_water: AtomicU32::new(0),
        }
    }
}

impl ProgressSink for Monotonic {
    fn report(&self, mut update: ProgressUpdate) {
        let previous = self.high_water.fetch_max(update.current, Ordering::SeqCst);
        update.current = update.current.max(previous);
        self.inner.report(update);
    }
}

/// Maps a sub-task's `(current, total)` into the `[from, to]` percentage band
/// of the parent run.
pub struct Scaled {
    inner: Arc<dyn ProgressSink>,
    from: u32,
    to: u32,
}

impl Scaled {
    pub fn new(inner: Arc<dyn ProgressSink>, from: u32, to: u32) -> Self {
        Self { inner, from, to }
    }
}

impl ProgressSink for Scaled {
    fn report(&self, update: ProgressUpdate) {
        let span = self.to.saturating_sub(self.from);
        let offset = if update.total == 0 {
            0
        } else {
            (u64::from(span) * u64::from(update.current.min(update.total)) / u64::from(update.total))
                as u32
        };
        self.inner
            .report(ProgressUpdate::percent(self.from + offset, update.message));
    }
}
