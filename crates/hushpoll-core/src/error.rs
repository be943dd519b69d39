//! Error taxonomy for questionnaire operations.
//!
//! Every failure a request can observe is one of the kinds below, and every
//! kind maps to a stable [`ErrorClass`] that the transport layer translates
//! into its own status vocabulary. Internal detail (SQL text, stack frames)
//! never crosses this boundary; the `Display` strings are the user-visible
//! messages.
//!
//! Two kinds are retryable: [`PollError::StorageConflict`] (optimistic
//! version check lost a race) and [`PollError::DecryptionFailure`]. Inside
//! the sweeper these are logged and retried on the next tick; on the request
//! path the submission gate retries conflicts a bounded number of times and
//! everything else is terminal.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by questionnaire operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PollError {
    /// No questionnaire matches the requested link.
    #[error("questionnaire not found: {link}")]
    NotFound {
        /// The link that matched nothing.
        link: String,
    },

    /// The questionnaire's deadline has passed.
    #[error("questionnaire {link} expired at {deadline}")]
    Expired {
        /// The questionnaire link.
        link: String,
        /// The deadline that has passed.
        deadline: DateTime<Utc>,
    },

    /// Results are hidden until the deadline.
    #[error("results for {link} are hidden until {deadline}")]
    VisibilityDenied {
        /// The questionnaire link.
        link: String,
        /// When results become visible.
        deadline: DateTime<Utc>,
    },

    /// No verified client identity accompanied the request.
    #[error("no verified client identity supplied")]
    Unauthenticated,

    /// This identity has already submitted a ballot here.
    #[error("identity has already submitted to questionnaire {link}")]
    DuplicateSubmission {
        /// The questionnaire link.
        link: String,
    },

    /// The ballot's ciphertext count does not match the question count.
    #[error("ballot has {got} ciphertexts but questionnaire {link} has {expected} questions")]
    MalformedBallot {
        /// The questionnaire link.
        link: String,
        /// Number of questions in the questionnaire.
        expected: usize,
        /// Number of ciphertexts in the ballot.
        got: usize,
    },

    /// Reveal was requested but nobody has responded.
    #[error("questionnaire {link} has no responses")]
    NoResponses {
        /// The questionnaire link.
        link: String,
    },

    /// The questionnaire is already decrypted.
    ///
    /// Soft kind: callers holding the cached payload treat this as the
    /// idempotent success path rather than a failure.
    #[error("questionnaire {link} is already decrypted")]
    AlreadyDecrypted {
        /// The questionnaire link.
        link: String,
    },

    /// Decrypting or decoding the accumulator failed. Retryable.
    #[error("decryption failed for {link}: {reason}")]
    DecryptionFailure {
        /// The questionnaire link.
        link: String,
        /// What went wrong.
        reason: String,
    },

    /// A concurrent writer updated the questionnaire first. Retryable.
    #[error("storage conflict on {link}: concurrent update")]
    StorageConflict {
        /// The questionnaire link.
        link: String,
    },

    /// A request field failed validation.
    #[error("invalid {field}: {reason}")]
    Validation {
        /// The offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An unexpected internal failure (storage engine, key material).
    #[error("internal error: {0}")]
    Internal(String),
}

impl PollError {
    /// Whether the operation may succeed if retried as-is.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StorageConflict { .. } | Self::DecryptionFailure { .. }
        )
    }

    /// The stable status classification carried to the API boundary.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } | Self::NoResponses { .. } => ErrorClass::NotFound,
            Self::Expired { .. } => ErrorClass::Gone,
            Self::VisibilityDenied { .. } => ErrorClass::Forbidden,
            Self::Unauthenticated => ErrorClass::Unauthorized,
            Self::DuplicateSubmission { .. }
            | Self::AlreadyDecrypted { .. }
            | Self::StorageConflict { .. } => ErrorClass::Conflict,
            Self::MalformedBallot { .. } | Self::Validation { .. } => ErrorClass::BadInput,
            Self::DecryptionFailure { .. } | Self::Internal(_) => ErrorClass::ServerError,
        }
    }
}

/// Transport-agnostic status classification of a [`PollError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The referenced resource does not exist.
    NotFound,
    /// The resource existed but is no longer available.
    Gone,
    /// The caller is known but not allowed to do this.
    Forbidden,
    /// The caller supplied no verified identity.
    Unauthorized,
    /// The request conflicts with current state.
    Conflict,
    /// The request itself is invalid.
    BadInput,
    /// The server failed; the request may be retried later.
    ServerError,
}
