//! Ballot admission control.
//!
//! Every inbound ballot passes through [`SubmissionGate::submit`], which
//! applies the admission checks in a fixed order (existence, deadline,
//! identity, shape, duplicate), merges the ballot into the homomorphic
//! accumulator, and applies the result atomically.
//!
//! Losing an optimistic-concurrency race is not a client error: the gate
//! re-reads the questionnaire and re-merges against the fresh accumulator,
//! up to [`MAX_CONFLICT_RETRIES`] times, before surfacing
//! [`PollError::StorageConflict`]. Re-merging from the fresh read is what
//! keeps concurrent submissions lossless: the ballot is always added to the
//! accumulator state the version check will accept.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use hushpoll_core::scheme::SchemeProvider;
use hushpoll_core::tally;
use hushpoll_core::wire::CiphertextWire;
use hushpoll_core::PollError;

use crate::store::SqliteStore;

/// How many times a lost version race is retried before giving up.
pub const MAX_CONFLICT_RETRIES: usize = 3;

/// Admission control for ballot submissions.
pub struct SubmissionGate {
    store: SqliteStore,
    provider: Arc<dyn SchemeProvider>,
}

impl SubmissionGate {
    /// Creates a gate over the given store and scheme provider.
    #[must_use]
    pub fn new(store: SqliteStore, provider: Arc<dyn SchemeProvider>) -> Self {
        Self { store, provider }
    }

    /// Admits one ballot and returns the new response count.
    ///
    /// `fingerprint` is the verified client-identity fingerprint supplied by
    /// the external trust layer, or `None` when the request carried no
    /// verified identity.
    ///
    /// Checks run in order: unknown link, passed deadline, missing identity,
    /// ciphertext count mismatch, repeat identity. The duplicate pre-check
    /// here is advisory; the unique constraint inside
    /// [`SqliteStore::apply_submission`] is what actually prevents two
    /// racing ballots from the same identity.
    pub fn submit(
        &self,
        link: &str,
        fingerprint: Option<&str>,
        ballot: &[CiphertextWire],
    ) -> Result<u64, PollError> {
        let mut attempt = 0;
        loop {
            let questionnaire = self.store.get_by_link(link)?;
            let now = Utc::now();
            if questionnaire.is_expired(now) {
                return Err(PollError::Expired {
                    link: questionnaire.link,
                    deadline: questionnaire.deadline,
                });
            }

            let fingerprint = match fingerprint {
                Some(fp) if !fp.trim().is_empty() => fp,
                _ => return Err(PollError::Unauthenticated),
            };

            if ballot.len() != questionnaire.questions.len() {
                return Err(PollError::MalformedBallot {
                    link: questionnaire.link,
                    expected: questionnaire.questions.len(),
                    got: ballot.len(),
                });
            }

            if self.store.has_submission(questionnaire.id, fingerprint)? {
                return Err(PollError::DuplicateSubmission {
                    link: questionnaire.link,
                });
            }

            // The questionnaire's own parameters, not the daemon's current
            // defaults, decide which scheme merges the ballot.
            let scheme = self
                .provider
                .scheme_for(questionnaire.params)
                .map_err(|e| {
                    PollError::Internal(format!("stored cipher parameters are unusable: {e}"))
                })?;
            let merged = tally::merge(
                scheme.as_ref(),
                questionnaire.accumulator.as_deref(),
                ballot,
            )?;

            match self
                .store
                .apply_submission(&questionnaire, &merged, fingerprint, now)
            {
                Ok(count) => {
                    info!(link = %questionnaire.link, responses = count, "ballot accepted");
                    return Ok(count);
                }
                Err(PollError::StorageConflict { .. }) if attempt < MAX_CONFLICT_RETRIES => {
                    attempt += 1;
                    debug!(
                        link = %questionnaire.link,
                        attempt,
                        "lost version race, re-merging against fresh accumulator"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}
