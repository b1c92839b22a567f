use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_EXPERIENCE_SCORE: f64 = 50.0;
pub const MAX_EDUCATION_SCORE: f64 = 20.0;
pub const MAX_DUTIES_SCORE: f64 = 20.0;
pub const MAX_COVER_LETTER_SCORE: f64 = 10.0;

/// One applicant's evaluation outcome.
///
/// `total_score` is always the sum of the four sub-scores. It is recomputed
/// after decoding and never taken from the evaluator's own total.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub experience_score: f64,
    pub experience_reasoning: String,
    pub education_score: f64,
    pub education_reasoning: String,
    pub duties_score: f64,
    pub duties_reasoning: String,
    pub cover_letter_score: f64,
    pub cover_letter_reasoning: String,
    pub total_score: f64,
}

impl Score {
    pub fn sub_score_sum(&self) -> f64 {
        self.experience_score + self.education_score + self.duties_score + self.cover_letter_score
    }

    /// Clamps every sub-score into its range and recomputes the total.
    pub fn normalized(mut self) -> Self {
        self.experience_score = clamp_score(self.experience_score, MAX_EXPERIENCE_SCORE);
        self.education_score = clamp_score(self.education_score, MAX_EDUCATION_SCORE);
        self.duties_score = clamp_score(self.duties_score, MAX_DUTIES_SCORE);
        self.cover_letter_score = clamp_score(self.cover_letter_score, MAX_COVER_LETTER_SCORE);
        self.total_score = self.sub_score_sum();
        self
    }

    /// True if any sub-score lies outside its documented range.
    pub fn is_out_of_range(&self) -> bool {
        [
            (self.experience_score, MAX_EXPERIENCE_SCORE),
            (self.education_score, MAX_EDUCATION_SCORE),
            (self.duties_score, MAX_DUTIES_SCORE),
            (self.cover_letter_score, MAX_COVER_LETTER_SCORE),
        ]
        .iter()
        .any(|&(value, max)| !(0.0..=max).contains(&value))
    }
}

/// NaN and `-0.0` both become `0.0`, so equal scores compare equal.
fn clamp_score(value: f64, max: f64) -> f64 {
    if value.is_nan() || value == 0.0 {
        return 0.0;
    }
    value.clamp(0.0, max)
}

/// An evaluated applicant with its final 1-based rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub name: String,
    pub scores: Score,
    pub rank: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv_path: Option<PathBuf>,
    #[serde(rename = "cl_path", skip_serializing_if = "Option::is_none")]
    pub cover_letter_path: Option<PathBuf>,
}

/// The durable result of a completed run, as consumed by front ends.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub applicants: Vec<RankedResult>,
    pub job_title: String,
    pub timestamp: DateTime<Utc>,
}
