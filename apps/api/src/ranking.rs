//! Ranker — deterministic ordering of evaluated applicants.
//!
//! Primary key: total score, descending. Ties fall through
//! experience → duties → education → cover letter, each descending.
//! Complete ties keep their input order (stable sort), so ranking an
//! already-ranked list is a no-op.

use std::cmp::Ordering;

use crate::models::{RankedResult, Score};

/// Orders results and assigns consecutive 1-based ranks. No rank is shared.
pub fn rank(mut results: Vec<RankedResult>) -> Vec<RankedResult> {
    results.sort_by(|a, b| compare_scores(&a.scores, &b.scores));

    for (i, result) in results.iter_mut().enumerate() {
        result.rank = i as u32 + 1;
    }

    results
}

/// `Ordering::Less` means `a` ranks ahead of `b`.
fn compare_scores(a: &Score, b: &Score) -> Ordering {
    descending(a.total_score, b.total_score)
        .then_with(|| descending(a.experience_score, b.experience_score))
        .then_with(|| descending(a.duties_score, b.duties_score))
        .then_with(|| descending(a.education_score, b.education_score))
        .then_with(|| descending(a.cover_letter_score, b.cover_letter_score))
}

fn descending(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, exp: f64, edu: f64, duties: f64, cl: f64) -> RankedResult {
        RankedResult {
            name: name.to_string(),
            scores: Score {
                experience_score: exp,
                education_score: edu,
                duties_score: duties,
                cover_letter_score: cl,
                ..Default::default()
            }
            .normalized(),
            rank: 0,
            cv_path: None,
            cover_letter_path: None,
        }
    }

    /// Scores taken as-is, total included, for tie scenarios that don't
    /// need to respect the sub-score ranges.
    fn raw_result(name: &str, total: f64, exp: f64, duties: f64, edu: f64) -> RankedResult {
        RankedResult {
            name: name.to_string(),
            scores: Score {
                total_score: total,
                experience_score: exp,
                duties_score: duties,
                education_score: edu,
                ..Default::default()
            },
            rank: 0,
            cv_path: None,
            cover_letter_path: None,
        }
    }

    fn names(results: &[RankedResult]) -> Vec<&str> {
        results.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_negative_zero_ties_keep_input_order() {
        let ranked = rank(vec![
            result("First", 30.0, 10.0, 10.0, -0.0),
            result("Second", 30.0, 10.0, 10.0, 0.0),
        ]);
        assert_eq!(names(&ranked), vec!["First", "Second"]);
    }

    #[test]
    fn test_sorts_by_total_descending() {
        let ranked = rank(vec![
            result("Alice", 30.0, 10.0, 20.0, 10.0),
            result("Bob", 50.0, 20.0, 10.0, 10.0),
            result("Carol", 40.0, 10.0, 20.0, 10.0),
        ]);
        assert_eq!(names(&ranked), vec!["Bob", "Carol", "Alice"]);
        assert_eq!(
            ranked.iter().map(|r| r.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_tie_on_total_broken_by_experience() {
        // both total 80
        let ranked = rank(vec![
            result("Alice", 40.0, 20.0, 15.0, 5.0),
            result("Bob", 45.0, 15.0, 15.0, 5.0),
        ]);
        assert_eq!(names(&ranked), vec!["Bob", "Alice"]);
    }

    #[test]
    fn test_tie_on_total_and_experience_broken_by_duties() {
        let ranked = rank(vec![
            result("Alice", 40.0, 20.0, 15.0, 5.0),
            result("Bob", 40.0, 17.0, 18.0, 5.0),
        ]);
        assert_eq!(names(&ranked), vec!["Bob", "Alice"]);
    }

    #[test]
    fn test_education_breaks_tie_after_experience_and_duties() {
        let ranked = rank(vec![
            raw_result("Alice", 80.0, 40.0, 15.0, 12.0),
            raw_result("Bob", 80.0, 40.0, 15.0, 18.0),
        ]);
        assert_eq!(ranked[0].scores.total_score, 80.0);
        assert_eq!(ranked[1].scores.total_score, 80.0);
        assert_eq!(names(&ranked), vec!["Bob", "Alice"]);
        assert!(ranked[0].rank < ranked[1].rank);
    }

    #[test]
    fn test_complete_tie_gets_distinct_ranks_in_input_order() {
        let ranked = rank(vec![
            result("Alice", 40.0, 18.0, 15.0, 7.0),
            result("Bob", 40.0, 18.0, 15.0, 7.0),
        ]);
        assert_eq!(names(&ranked), vec!["Alice", "Bob"]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn test_ranking_is_idempotent() {
        let once = rank(vec![
            result("Dan", 20.0, 10.0, 10.0, 0.0),
            result("Alice", 40.0, 18.0, 15.0, 7.0),
            result("Bob", 40.0, 18.0, 15.0, 7.0),
            result("Carol", 45.0, 20.0, 20.0, 10.0),
        ]);
        let twice = rank(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_input_ranks_to_empty() {
        assert!(rank(Vec::new()).is_empty());
    }
}
