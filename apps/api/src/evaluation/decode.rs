//! Decodes the evaluator's text response into a `Score`.
//!
//! The evaluator is asked for bare JSON but does not always comply, so the
//! response goes through an ordered chain of strategies:
//!
//! 1. the whole response is the JSON object
//! 2. the object sits inside a fenced code block
//! 3. the object is embedded in prose (first `{` to last `}`)
//!
//! Each strategy yields `Attempt::Continue` when its shape does not apply.
//! A candidate that is a JSON object but not a score record (wrong types, or
//! none of the four sub-scores) is `Fatal`: later strategies would only find
//! the same object again.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::Score;

/// How much of the original response is kept in errors.
const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no JSON object found in evaluator response: {preview}")]
    NoStructuredContent { preview: String },

    #[error("evaluator JSON is not a score record ({source}): {preview}")]
    InvalidShape {
        source: serde_json::Error,
        preview: String,
    },

    #[error("evaluator JSON has none of the score fields: {preview}")]
    NoScores { preview: String },
}

/// Outcome of a single decode strategy.
#[derive(Debug)]
pub enum Attempt {
    Decoded(Score),
    Continue,
    Fatal(DecodeError),
}

type Strategy = fn(&str) -> Attempt;

const STRATEGIES: &[(&str, Strategy)] = &[
    ("direct", decode_direct),
    ("fenced", decode_fenced),
    ("embedded", decode_embedded),
];

/// Runs the strategy chain. The returned score has its total recomputed.
pub fn decode_score(response: &str) -> Result<Score, DecodeError> {
    for (name, strategy) in STRATEGIES {
        match strategy(response) {
            Attempt::Decoded(score) => {
                debug!(strategy = *name, "decoded evaluator response");
                return Ok(score);
            }
            Attempt::Continue => continue,
            Attempt::Fatal(err) => return Err(err),
        }
    }

    Err(DecodeError::NoStructuredContent {
        preview: preview(response),
    })
}

fn decode_direct(response: &str) -> Attempt {
    interpret(response.trim(), response)
}

fn decode_fenced(response: &str) -> Attempt {
    match strip_code_fence(response) {
        Some(inner) => interpret(inner, response),
        None => Attempt::Continue,
    }
}

fn decode_embedded(response: &str) -> Attempt {
    let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) else {
        return Attempt::Continue;
    };
    if start >= end {
        return Attempt::Continue;
    }
    interpret(&response[start..=end], response)
}

/// Returns the body of the first fenced block, without the language tag.
/// An unterminated fence yields everything after the opening line.
fn strip_code_fence(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_ticks = &text[open + 3..];
    // The rest of the opening line is the language tag, e.g. "json"
    let body_start = after_ticks.find('\n').map(|i| i + 1).unwrap_or(after_ticks.len());
    let body = &after_ticks[body_start..];
    let body = match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    };
    Some(body.trim())
}

fn interpret(candidate: &str, original: &str) -> Attempt {
    let value: Value = match serde_json::from_str(candidate) {
        Ok(v) => v,
        Err(_) => return Attempt::Continue,
    };
    if !value.is_object() {
        return Attempt::Continue;
    }

    match serde_json::from_value::<RawScore>(value) {
        Ok(raw) if raw.has_any_score() => Attempt::Decoded(raw.into_score()),
        Ok(_) => Attempt::Fatal(DecodeError::NoScores {
            preview: preview(original),
        }),
        Err(source) => Attempt::Fatal(DecodeError::InvalidShape {
            source,
            preview: preview(original),
        }),
    }
}

/// First `PREVIEW_CHARS` characters, with "..." when cut.
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Wire shape of the evaluator's JSON. A missing or null sub-score counts as
/// 0; reasoning defaults to empty; the reported total is read only to be
/// discarded.
#[derive(Debug, Deserialize)]
struct RawScore {
    #[serde(default, deserialize_with = "lenient_number")]
    experience_score: Option<f64>,
    #[serde(default)]
    experience_reasoning: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    education_score: Option<f64>,
    #[serde(default)]
    education_reasoning: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    duties_score: Option<f64>,
    #[serde(default)]
    duties_reasoning: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    cover_letter_score: Option<f64>,
    #[serde(default)]
    cover_letter_reasoning: Option<String>,
    #[serde(default)]
    total_score: Option<Value>,
}

impl RawScore {
    fn has_any_score(&self) -> bool {
        [
            self.experience_score,
            self.education_score,
            self.duties_score,
            self.cover_letter_score,
        ]
        .iter()
        .any(Option::is_some)
    }

    fn into_score(self) -> Score {
        let score = Score {
            experience_score: or_zero("experience_score", self.experience_score),
            experience_reasoning: self.experience_reasoning.unwrap_or_default(),
            education_score: or_zero("education_score", self.education_score),
            education_reasoning: self.education_reasoning.unwrap_or_default(),
            duties_score: or_zero("duties_score", self.duties_score),
            duties_reasoning: self.duties_reasoning.unwrap_or_default(),
            cover_letter_score: or_zero("cover_letter_score", self.cover_letter_score),
            cover_letter_reasoning: self.cover_letter_reasoning.unwrap_or_default(),
            total_score: 0.0,
        };
        let total = score.sub_score_sum();
        if let Some(reported) = self.total_score {
            debug!(%reported, computed = total, "ignoring evaluator-reported total");
        }
        Score {
            total_score: total,
            ..score
        }
    }
}

fn or_zero(field: &str, value: Option<f64>) -> f64 {
    value.unwrap_or_else(|| {
        warn!(field, "evaluator omitted a sub-score; counting it as 0");
        0.0
    })
}

/// Accepts `45`, `45.5`, `"45"` or `null`.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
    }

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("expected a number, got {s:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &str = r#"{
        "experience_score": 45,
        "experience_reasoning": "Strong Go background",
        "education_score": 18,
        "education_reasoning": "BSc CS",
        "duties_score": 17,
        "duties_reasoning": "Covers most duties",
        "cover_letter_score": 8,
        "cover_letter_reasoning": "Well aligned",
        "total_score": 99
    }"#;

    #[test]
    fn test_total_is_recomputed_not_trusted() {
        let score = decode_score(RECORD).unwrap();
        assert_eq!(score.total_score, 88.0);
        assert_eq!(score.experience_reasoning, "Strong Go background");
    }

    #[test]
    fn test_bare_fenced_and_embedded_decode_identically() {
        let bare = decode_score(RECORD).unwrap();
        let fenced = decode_score(&format!("```json\n{RECORD}\n```")).unwrap();
        let embedded =
            decode_score(&format!("Here are the scores:\n{RECORD}\nHope this helps!")).unwrap();

        assert_eq!(bare, fenced);
        assert_eq!(bare, embedded);
    }

    #[test]
    fn test_fence_without_language_tag() {
        let score = decode_score(&format!("```\n{RECORD}\n```")).unwrap();
        assert_eq!(score.total_score, 88.0);
    }

    #[test]
    fn test_fence_surrounded_by_prose() {
        let response = format!("Sure! Here you go:\n```json\n{RECORD}\n```\nLet me know.");
        assert_eq!(decode_score(&response).unwrap().duties_score, 17.0);
    }

    #[test]
    fn test_no_json_fails_with_preview_of_response() {
        let err = decode_score("This response has no JSON object").unwrap_err();
        match err {
            DecodeError::NoStructuredContent { preview } => {
                assert_eq!(preview, "This response has no JSON object");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_json_between_braces_fails() {
        let err = decode_score("{ invalid json }").unwrap_err();
        assert!(matches!(err, DecodeError::NoStructuredContent { .. }));
    }

    #[test]
    fn test_long_response_preview_is_truncated() {
        let response = "no json here ".repeat(100);
        let err = decode_score(&response).unwrap_err();
        let message = err.to_string();
        assert!(message.ends_with("..."));
        assert!(message.len() < response.len());
    }

    #[test]
    fn test_object_without_any_score_is_fatal() {
        let err = decode_score(r#"{"note": "partial", "verdict": "good"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::NoScores { .. }));
        assert!(err.to_string().contains("partial"));
    }

    #[test]
    fn test_wrongly_typed_score_is_fatal() {
        let err = decode_score(r#"{"experience_score": [40], "education_score": 10}"#).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidShape { .. }));
    }

    #[test]
    fn test_null_sub_score_counts_as_zero() {
        let response = r#"{
            "experience_score": 40,
            "education_score": 15,
            "duties_score": 18,
            "cover_letter_score": null,
            "cover_letter_reasoning": null
        }"#;
        let score = decode_score(response).unwrap();
        assert_eq!(score.cover_letter_score, 0.0);
        assert_eq!(score.total_score, 73.0);
    }

    #[test]
    fn test_missing_sub_score_counts_as_zero() {
        let response = r#"{"experience_score": 40, "education_score": 15, "duties_score": 18}"#;
        let score = decode_score(response).unwrap();
        assert_eq!(score.cover_letter_score, 0.0);
        assert_eq!(score.total_score, 73.0);
    }

    #[test]
    fn test_numbers_as_strings_are_accepted() {
        let response = r#"{
            "experience_score": "40",
            "education_score": 15.5,
            "duties_score": "18",
            "cover_letter_score": 7
        }"#;
        let score = decode_score(response).unwrap();
        assert_eq!(score.total_score, 80.5);
        assert_eq!(score.experience_reasoning, "");
    }

    #[test]
    fn test_leading_number_does_not_stop_the_chain() {
        let response = format!("3 candidates were reviewed. This one: {RECORD}");
        assert_eq!(decode_score(&response).unwrap().total_score, 88.0);
    }

    #[test]
    fn test_preview_is_char_boundary_safe() {
        let text = "é".repeat(300);
        let p = preview(&text);
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
    }
}
