//! Questionnaire data model.
//!
//! # Invariants
//!
//! - Every question carries exactly [`OPTIONS_PER_QUESTION`] option labels,
//!   validated at creation time.
//! - `accumulator` is either absent (no ballots yet) or has one ciphertext
//!   per question.
//! - `response_count` equals the number of submission records for the
//!   questionnaire.
//! - `decrypted_results` is present iff `is_decrypted` is set; once set the
//!   entity is effectively read-only.
//!
//! The secret key is deliberately not part of [`Questionnaire`]: it is
//! loaded separately, only by the result revealer, for the duration of a
//! reveal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PollError;
use crate::results::TallyResult;
use crate::wire::{CiphertextWire, PublicKeyWire};

/// Number of option labels every question must carry. Matches the slot
/// count of the default cipher parameters: one plaintext slot per option.
pub const OPTIONS_PER_QUESTION: usize = 8;

/// Option label excluded from rendered results regardless of vote count.
pub const SENTINEL_OPTION: &str = "N/A";

/// Returns true if a label is the sentinel, compared case- and
/// whitespace-insensitively.
#[must_use]
pub fn is_sentinel(label: &str) -> bool {
    label.trim().eq_ignore_ascii_case(SENTINEL_OPTION)
}

/// One question: a free-text prompt and its fixed set of option labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// The prompt shown to respondents.
    #[serde(alias = "text")]
    pub prompt: String,
    /// Exactly [`OPTIONS_PER_QUESTION`] option labels.
    pub options: Vec<String>,
}

impl Question {
    /// Validates the question at creation time.
    pub fn validate(&self, index: usize) -> Result<(), PollError> {
        if self.prompt.trim().is_empty() {
            return Err(PollError::Validation {
                field: format!("questions[{index}].prompt"),
                reason: "prompt must not be empty".to_string(),
            });
        }
        if self.options.len() != OPTIONS_PER_QUESTION {
            return Err(PollError::Validation {
                field: format!("questions[{index}].options"),
                reason: format!(
                    "question must have exactly {OPTIONS_PER_QUESTION} options, got {}",
                    self.options.len()
                ),
            });
        }
        Ok(())
    }
}

/// Cipher parameters, passed through opaquely to the scheme collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CryptoParams {
    /// Degree of the polynomial ring (power of two).
    #[serde(alias = "polyDegree")]
    pub poly_degree: usize,
    /// Plaintext modulus; bounds per-option vote counts.
    #[serde(alias = "plainModulus")]
    pub plain_modulus: u64,
    /// Ciphertext coefficient modulus.
    #[serde(alias = "ciphModulus")]
    pub ciph_modulus: u64,
}

impl Default for CryptoParams {
    fn default() -> Self {
        Self {
            poly_degree: 8,
            plain_modulus: 17,
            ciph_modulus: 8_000_000_000_000,
        }
    }
}

/// A questionnaire as read back from the store.
///
/// The secret key is intentionally absent; see the module docs.
#[derive(Debug, Clone)]
pub struct Questionnaire {
    /// Storage identifier.
    pub id: i64,
    /// Unique opaque link token.
    pub link: String,
    /// Ordered question list.
    pub questions: Vec<Question>,
    /// UTC deadline; ballots are rejected strictly after it.
    pub deadline: DateTime<Utc>,
    /// Cipher parameters for this questionnaire.
    pub params: CryptoParams,
    /// Public key clients encrypt under.
    pub public_key: PublicKeyWire,
    /// Running homomorphic sum, one ciphertext per question; `None` until
    /// the first ballot is accepted.
    pub accumulator: Option<Vec<CiphertextWire>>,
    /// Number of accepted distinct-identity submissions.
    pub response_count: u64,
    /// When true, reveal is denied until the deadline passes.
    pub hide_results_until_deadline: bool,
    /// Cached decrypted tally, set once by the revealer.
    pub decrypted_results: Option<TallyResult>,
    /// Whether the accumulator has been decrypted.
    pub is_decrypted: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped on every mutation.
    pub version: i64,
}

impl Questionnaire {
    /// Whether the deadline has passed at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }
}

/// One accepted submission: which identity answered which questionnaire.
///
/// `(questionnaire_id, fingerprint)` is unique; that constraint is the sole
/// mechanism preventing double voting. The fingerprint is an opaque string
/// derived from a client credential by the external trust layer and is
/// never linkable to ballot contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    /// The questionnaire answered.
    pub questionnaire_id: i64,
    /// Verified identity fingerprint of the submitter.
    pub fingerprint: String,
    /// When the ballot was accepted.
    pub submitted_at: DateTime<Utc>,
}

/// Summary row for listings.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionnaireSummary {
    /// Unique link token.
    pub link: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// UTC deadline.
    pub deadline: DateTime<Utc>,
    /// Accepted submission count.
    pub response_count: u64,
    /// Number of questions.
    pub question_count: usize,
    /// Whether the deadline has passed.
    pub is_expired: bool,
}

/// Lightweight statistics that never touch ciphertexts.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionnaireStats {
    /// Unique link token.
    pub link: String,
    /// Accepted submission count.
    pub response_count: u64,
    /// UTC deadline.
    pub deadline: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Whether the deadline has passed.
    pub is_expired: bool,
}
