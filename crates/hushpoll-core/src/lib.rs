//! hushpoll-core - domain model for the encrypted questionnaire system.
//!
//! Respondents encrypt a one-hot indicator vector per question under a
//! questionnaire's public key and submit the resulting ciphertexts as a
//! ballot. The server never sees a plaintext answer: accepted ballots are
//! folded into a running homomorphic sum, and only after the deadline is the
//! accumulator decrypted into a percentage-annotated tally.
//!
//! This crate holds the pure half of the system:
//!
//! - [`model`]: questionnaire, question, and submission-record types
//! - [`wire`]: JSON wire types for polynomials, ciphertexts, and keys
//! - [`tally`]: the homomorphic tally accumulator
//! - [`results`]: decrypted-tally formatting (sentinel filtering,
//!   percentages)
//! - [`scheme`]: the cipher-scheme collaborator trait and a reference BFV
//!   implementation
//! - [`error`]: the error taxonomy shared with the daemon
//! - [`config`]: TOML configuration
//!
//! Persistence, admission control, and the background expiry sweeper live in
//! `hushpoll-daemon`.

pub mod config;
pub mod error;
pub mod model;
pub mod results;
pub mod scheme;
pub mod tally;
pub mod wire;

pub use config::PollConfig;
pub use error::{ErrorClass, PollError};
pub use model::{
    CryptoParams, Question, Questionnaire, QuestionnaireStats, QuestionnaireSummary,
    SubmissionRecord, OPTIONS_PER_QUESTION, SENTINEL_OPTION,
};
pub use results::{OptionTally, QuestionTally, TallyResult};
pub use scheme::{BfvProvider, CipherScheme, KeyPair, SchemeError, SchemeProvider};
pub use wire::{CiphertextWire, PolynomialWire, PublicKeyWire, SecretKeyWire};
