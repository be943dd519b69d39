//! Decrypted-tally formatting.
//!
//! Turns the decoded per-question vote vectors into the payload served to
//! clients: per-option vote counts and percentages, with sentinel options
//! (`N/A`, compared case- and whitespace-insensitively) dropped entirely
//! from the output regardless of their decoded count.
//!
//! Field order is fixed by declaration order, so serializing the same
//! [`TallyResult`] twice yields byte-identical JSON; the revealer relies on
//! that for its idempotency guarantee.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{is_sentinel, Question};

/// Vote count and percentage for one surviving option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionTally {
    /// The option label.
    pub option: String,
    /// Decoded vote count.
    pub votes: u64,
    /// `votes / response_count * 100`, rounded to 2 decimal places.
    pub percentage: f64,
}

/// Tally for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionTally {
    /// The question prompt.
    pub question: String,
    /// Per-option tallies, sentinel options removed.
    pub results: Vec<OptionTally>,
}

/// The full revealed payload for a questionnaire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TallyResult {
    /// The questionnaire link.
    pub link: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// The deadline that gated this reveal.
    pub deadline: DateTime<Utc>,
    /// Number of accepted submissions the percentages are relative to.
    pub response_count: u64,
    /// Per-question tallies.
    pub results: Vec<QuestionTally>,
}

/// Formats one question's decoded vote vector.
///
/// `response_count == 0` cannot be reached through the revealer (it rejects
/// empty questionnaires first) but is still handled by reporting 0%.
#[must_use]
pub fn format_question(question: &Question, decoded: &[u64], response_count: u64) -> QuestionTally {
    let results = question
        .options
        .iter()
        .zip(decoded)
        .filter(|(label, _)| !is_sentinel(label))
        .map(|(label, &votes)| OptionTally {
            option: label.clone(),
            votes,
            percentage: percentage(votes, response_count),
        })
        .collect();
    QuestionTally {
        question: question.prompt.clone(),
        results,
    }
}

fn percentage(votes: u64, response_count: u64) -> f64 {
    if response_count == 0 {
        return 0.0;
    }
    round2(votes as f64 / response_count as f64 * 100.0)
}

/// Rounds to 2 decimal places, half away from zero.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(options: &[&str]) -> Question {
        Question {
            prompt: "Which slot?".to_string(),
            options: options.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    const LABELS: [&str; 8] = ["a", "b", "c", "d", "e", "f", "g", "h"];

    #[test]
    fn percentages_round_to_two_decimals() {
        let q = question(&LABELS);
        let tally = format_question(&q, &[1, 1, 0, 1, 0, 0, 0, 0], 3);
        assert_eq!(tally.results[0].percentage, 33.33);
        assert_eq!(tally.results[1].percentage, 33.33);
        assert_eq!(tally.results[2].percentage, 0.0);
        assert_eq!(tally.results[3].votes, 1);
    }

    #[test]
    fn zero_responses_reports_zero_percent() {
        let q = question(&LABELS);
        let tally = format_question(&q, &[0; 8], 0);
        assert!(tally.results.iter().all(|r| r.percentage == 0.0));
    }

    #[test]
    fn sentinel_option_is_dropped() {
        let q = question(&["a", "N/A", "c", "d", "e", "f", "g", "h"]);
        let tally = format_question(&q, &[1, 0, 1, 0, 0, 0, 0, 0], 2);
        assert_eq!(tally.results.len(), 7);
        assert!(tally.results.iter().all(|r| r.option != "N/A"));
    }

    #[test]
    fn sentinel_dropped_even_with_nonzero_votes() {
        // Correct clients never vote for the sentinel, but nothing prevents
        // a crafted ballot from doing so; the option is dropped regardless.
        let q = question(&["a", " n/a ", "c", "d", "e", "f", "g", "h"]);
        let tally = format_question(&q, &[1, 5, 1, 0, 0, 0, 0, 0], 7);
        assert_eq!(tally.results.len(), 7);
        assert!(tally.results.iter().all(|r| r.votes != 5));
    }

    #[test]
    fn serialization_is_deterministic() {
        let q = question(&LABELS);
        let tally = TallyResult {
            link: "l".to_string(),
            created_at: Utc::now(),
            deadline: Utc::now(),
            response_count: 3,
            results: vec![format_question(&q, &[1, 1, 0, 1, 0, 0, 0, 0], 3)],
        };
        let a = serde_json::to_string(&tally).unwrap();
        let b = serde_json::to_string(&tally).unwrap();
        assert_eq!(a, b);
    }
}
