//! Builds the bounded-size evaluation request for one applicant.

use std::borrow::Cow;
use std::fmt::Write;

use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::models::{ApplicantRecord, JobSpecification};

pub const MAX_CV_BYTES: usize = 15_000;
pub const MAX_COVER_LETTER_BYTES: usize = 5_000;
pub const CV_TRUNCATION_MARKER: &str = "\n[CV truncated for length]";
pub const COVER_LETTER_TRUNCATION_MARKER: &str = "\n[Cover letter truncated for length]";

/// Requirement lists longer than this are condensed with a "(+K more)" suffix.
pub const MAX_REQUIREMENTS_PER_LIST: usize = 5;

/// A fully rendered request: system instructions plus the user prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRequest {
    pub system: &'static str,
    pub prompt: String,
}

const SCORING_SCHEMA: &str = r#"{
  "experience_score": <0-50>,
  "experience_reasoning": "<how the experience matches, required vs nice-to-have>",
  "education_score": <0-20>,
  "education_reasoning": "<how the education matches, required vs nice-to-have>",
  "duties_score": <0-20>,
  "duties_reasoning": "<ability to perform the listed duties>",
  "cover_letter_score": <0-10>,
  "cover_letter_reasoning": "<quality and alignment of the cover letter>"
}"#;

const SCORING_CRITERIA: &str = "\
- Experience (0-50): weighted towards required experience. Each missing required item costs 10-15 points, each missing nice-to-have 2-5.
- Education (0-20): a missing required qualification costs 10+ points, a missing nice-to-have 2-3.
- Duties (0-20): each required duty the applicant cannot evidence costs 5-7 points.
- Cover letter (0-10): quality, relevance and alignment with the role. No cover letter scores 0.";

/// Renders `"<category>: a; b; c (+K more)\n"`, keeping the first `max_items`
/// in their original order. Empty lists render as an empty string.
pub fn condense_requirements(category: &str, items: &[String], max_items: usize) -> String {
    if items.is_empty() {
        return String::new();
    }

    let shown = items.len().min(max_items);
    let mut line = format!("{category}: {}", items[..shown].join("; "));
    let hidden = items.len() - shown;
    if hidden > 0 {
        let _ = write!(line, " (+{hidden} more)");
    }
    line.push('\n');
    line
}

/// Cuts `text` to at most `max_bytes` (on a char boundary) and appends
/// `marker` when anything was removed.
pub fn truncate_with_marker<'a>(text: &'a str, max_bytes: usize, marker: &str) -> Cow<'a, str> {
    if text.len() <= max_bytes {
        return Cow::Borrowed(text);
    }

    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }

    let mut truncated = String::with_capacity(cut + marker.len());
    truncated.push_str(&text[..cut]);
    truncated.push_str(marker);
    Cow::Owned(truncated)
}

pub fn build_request(record: &ApplicantRecord, job: &JobSpecification) -> EvaluationRequest {
    let mut prompt = String::with_capacity(MAX_CV_BYTES + MAX_COVER_LETTER_BYTES + 4_096);

    prompt.push_str(
        "Evaluate the following job applicant against the job description and score them.\n\n",
    );

    prompt.push_str("## JOB DESCRIPTION\n");
    let _ = writeln!(prompt, "Title: {}", job.title);
    let _ = writeln!(prompt, "Description: {}\n", job.description);

    prompt.push_str("### REQUIRED QUALIFICATIONS (must have, high weight)\n");
    push_condensed(&mut prompt, "Experience", &job.required_experience);
    push_condensed(&mut prompt, "Education", &job.required_education);
    push_condensed(&mut prompt, "Duties", &job.required_duties);

    prompt.push_str("\n### NICE TO HAVE QUALIFICATIONS (optional, low weight)\n");
    push_condensed(&mut prompt, "Experience", &job.nice_to_have_experience);
    push_condensed(&mut prompt, "Education", &job.nice_to_have_education);
    push_condensed(&mut prompt, "Duties", &job.nice_to_have_duties);

    prompt.push_str("\n## APPLICANT\n");
    let _ = writeln!(prompt, "Name: {}\n", record.name);

    prompt.push_str("### CV\n");
    prompt.push_str(&truncate_with_marker(
        &record.cv_text,
        MAX_CV_BYTES,
        CV_TRUNCATION_MARKER,
    ));
    prompt.push_str("\n\n");

    match record.cover_letter_text.as_deref() {
        Some(letter) if record.has_cover_letter() => {
            prompt.push_str("### COVER LETTER\n");
            prompt.push_str(&truncate_with_marker(
                letter,
                MAX_COVER_LETTER_BYTES,
                COVER_LETTER_TRUNCATION_MARKER,
            ));
            prompt.push_str("\n\n");
        }
        _ => prompt.push_str("### COVER LETTER\nNone provided.\n\n"),
    }

    prompt.push_str("## INSTRUCTIONS\n");
    prompt.push_str(
        "Missing REQUIRED qualifications must significantly lower the score; \
         missing NICE TO HAVE qualifications only slightly.\n\n",
    );
    prompt.push_str("Respond with ONLY this JSON object, no prose and no code fences:\n");
    prompt.push_str(SCORING_SCHEMA);
    prompt.push_str("\n\nScoring criteria:\n");
    prompt.push_str(SCORING_CRITERIA);
    prompt.push('\n');

    EvaluationRequest {
        system: JSON_ONLY_SYSTEM,
        prompt,
    }
}

fn push_condensed(prompt: &mut String, category: &str, items: &[String]) {
    prompt.push_str(&condense_requirements(
        category,
        items,
        MAX_REQUIREMENTS_PER_LIST,
    ));
}
