use std::path::PathBuf;

use serde::Serialize;

/// One candidate's inputs, matched from the document store.
///
/// Only materialized when CV text is present. Consumed once by the evaluator
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicantRecord {
    pub name: String,
    pub cv_text: String,
    pub cv_path: PathBuf,
    pub cover_letter_text: Option<String>,
    pub cover_letter_path: Option<PathBuf>,
}

impl ApplicantRecord {
    pub fn has_cover_letter(&self) -> bool {
        self.cover_letter_text
            .as_deref()
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false)
    }
}
