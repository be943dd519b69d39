//! Deadline-gated result reveal.
//!
//! [`ResultRevealer::reveal`] decrypts a questionnaire's accumulator into
//! the percentage-annotated tally, exactly once. The operation is
//! idempotent: the first successful reveal persists its payload under an
//! `is_decrypted = 0 AND version = ?` guard, and every later call
//! (including a concurrent one that decrypted in parallel but lost the
//! persist race) serves that first payload byte for byte.
//!
//! The version half of the guard closes a lost-ballot window: a submission
//! that passed the gate's deadline check just before expiry can commit
//! between the revealer's read and its persist. When that happens the
//! conditional write touches zero rows and the revealer re-reads and
//! re-decrypts, the same way the gate handles a lost version race.
//!
//! Decryption always uses a scheme built from the questionnaire's own
//! stored parameters. The secret key exists in memory only inside this
//! module, for the duration of a single attempt, and is dropped before the
//! tally is persisted.

use std::sync::Arc;

use chrono::Utc;
use secrecy::ExposeSecret;
use tracing::{debug, info};

use hushpoll_core::results::{self, TallyResult};
use hushpoll_core::scheme::SchemeProvider;
use hushpoll_core::wire::SecretKeyWire;
use hushpoll_core::PollError;

use crate::gate::MAX_CONFLICT_RETRIES;
use crate::store::SqliteStore;

/// Decrypts and persists questionnaire tallies.
pub struct ResultRevealer {
    store: SqliteStore,
    provider: Arc<dyn SchemeProvider>,
}

impl ResultRevealer {
    /// Creates a revealer over the given store and scheme provider.
    #[must_use]
    pub fn new(store: SqliteStore, provider: Arc<dyn SchemeProvider>) -> Self {
        Self { store, provider }
    }

    /// Returns the revealed tally for a questionnaire, decrypting it first
    /// if nobody has yet.
    ///
    /// Preconditions, in order: the questionnaire must exist, must have at
    /// least one response, and (when results are hidden) its deadline must
    /// have passed. An already-revealed questionnaire short-circuits to the
    /// cached payload without touching key material.
    pub fn reveal(&self, link: &str) -> Result<TallyResult, PollError> {
        let mut attempt = 0;
        loop {
            let questionnaire = self.store.get_by_link(link)?;

            if questionnaire.is_decrypted {
                debug!(link = %questionnaire.link, "serving cached tally");
                return questionnaire.decrypted_results.ok_or_else(|| {
                    PollError::Internal(format!(
                        "questionnaire {} is marked decrypted but has no stored tally",
                        questionnaire.link
                    ))
                });
            }

            if questionnaire.response_count == 0 {
                return Err(PollError::NoResponses {
                    link: questionnaire.link,
                });
            }

            if questionnaire.hide_results_until_deadline
                && !questionnaire.is_expired(Utc::now())
            {
                return Err(PollError::VisibilityDenied {
                    link: questionnaire.link,
                    deadline: questionnaire.deadline,
                });
            }

            let Some(accumulator) = &questionnaire.accumulator else {
                return Err(PollError::Internal(format!(
                    "questionnaire {} has {} responses but no accumulator",
                    questionnaire.link, questionnaire.response_count
                )));
            };
            if accumulator.len() != questionnaire.questions.len() {
                return Err(PollError::Internal(format!(
                    "questionnaire {} has {} questions but accumulator holds {} ciphertexts",
                    questionnaire.link,
                    questionnaire.questions.len(),
                    accumulator.len()
                )));
            }

            // The scheme this questionnaire was created under, which may
            // predate the daemon's current default parameters.
            let scheme = self
                .provider
                .scheme_for(questionnaire.params)
                .map_err(|e| {
                    PollError::Internal(format!("stored cipher parameters are unusable: {e}"))
                })?;

            let tallies = {
                let secret_json = self.store.load_secret_key(questionnaire.id)?;
                let secret: SecretKeyWire = serde_json::from_str(secret_json.expose_secret())
                    .map_err(|e| PollError::DecryptionFailure {
                        link: questionnaire.link.clone(),
                        reason: format!("stored secret key is unreadable: {e}"),
                    })?;

                let mut tallies = Vec::with_capacity(questionnaire.questions.len());
                for (question, ciphertext) in questionnaire.questions.iter().zip(accumulator) {
                    let plain = scheme.decrypt(ciphertext, &secret).map_err(|e| {
                        PollError::DecryptionFailure {
                            link: questionnaire.link.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                    let decoded =
                        scheme
                            .decode(&plain)
                            .map_err(|e| PollError::DecryptionFailure {
                                link: questionnaire.link.clone(),
                                reason: e.to_string(),
                            })?;
                    tallies.push(results::format_question(
                        question,
                        &decoded,
                        questionnaire.response_count,
                    ));
                }
                tallies
                // Secret key dropped here, before anything is persisted.
            };

            let tally = TallyResult {
                link: questionnaire.link.clone(),
                created_at: questionnaire.created_at,
                deadline: questionnaire.deadline,
                response_count: questionnaire.response_count,
                results: tallies,
            };

            if self
                .store
                .persist_reveal(questionnaire.id, questionnaire.version, &tally)?
            {
                info!(
                    link = %questionnaire.link,
                    responses = questionnaire.response_count,
                    "questionnaire tally revealed"
                );
                return Ok(tally);
            }

            let fresh = self.store.get_by_link(link)?;
            if fresh.is_decrypted {
                // A concurrent reveal persisted first; its payload is
                // canonical.
                debug!(link = %questionnaire.link, "lost reveal race, serving first writer's tally");
                return fresh.decrypted_results.ok_or_else(|| {
                    PollError::Internal(format!(
                        "questionnaire {link} lost the reveal race but has no stored tally"
                    ))
                });
            }

            // A ballot landed mid-decrypt; the tally we computed is stale.
            if attempt >= MAX_CONFLICT_RETRIES {
                return Err(PollError::StorageConflict {
                    link: questionnaire.link,
                });
            }
            attempt += 1;
            debug!(
                link = %questionnaire.link,
                attempt,
                "accumulator moved during reveal, re-decrypting"
            );
        }
    }
}
