//! Questionnaire service facade.
//!
//! [`QuestionnaireService`] is the transport-agnostic surface the API layer
//! calls into: creation, the public read view, ballot submission, stats,
//! results, listing, and a health probe. Errors carry a stable
//! [`hushpoll_core::ErrorClass`] so any transport can map them to its own
//! status vocabulary without inspecting variants.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use hushpoll_core::model::{
    CryptoParams, Question, QuestionnaireStats, QuestionnaireSummary,
};
use hushpoll_core::results::TallyResult;
use hushpoll_core::scheme::SchemeProvider;
use hushpoll_core::wire::{CiphertextWire, PublicKeyWire};
use hushpoll_core::PollError;

use crate::gate::SubmissionGate;
use crate::reveal::ResultRevealer;
use crate::store::{NewQuestionnaire, SqliteStore};

/// Longest accepted custom link.
const MAX_LINK_LEN: usize = 64;

/// A questionnaire-creation request.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRequest {
    /// Questions, each with its fixed option labels.
    pub questions: Vec<Question>,
    /// UTC deadline; must be in the future.
    pub deadline: DateTime<Utc>,
    /// Optional custom link token; a random one is generated when absent.
    #[serde(default, alias = "customLink")]
    pub link: Option<String>,
    /// Whether to hide results until the deadline. Defaults to hidden.
    #[serde(default = "default_hide", alias = "hideResultsUntilDeadline")]
    pub hide_results_until_deadline: bool,
}

const fn default_hide() -> bool {
    true
}

/// What creation hands back: everything a client needs to answer.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedQuestionnaire {
    /// The (possibly generated) link token.
    pub link: String,
    /// Cipher parameters clients must encrypt under.
    pub params: CryptoParams,
    /// The public encryption key.
    pub public_key: PublicKeyWire,
    /// The deadline, echoed back.
    pub deadline: DateTime<Utc>,
}

/// The public read view of a questionnaire: enough to render and answer it,
/// nothing more. Ciphertexts and counters stay server-side.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionnaireView {
    /// Link token.
    pub link: String,
    /// Questions to render.
    pub questions: Vec<Question>,
    /// UTC deadline.
    pub deadline: DateTime<Utc>,
    /// Cipher parameters for client-side encryption.
    pub params: CryptoParams,
    /// Public encryption key.
    pub public_key: PublicKeyWire,
    /// Whether results stay hidden until the deadline.
    pub hide_results_until_deadline: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Transport-agnostic questionnaire operations.
pub struct QuestionnaireService {
    store: SqliteStore,
    provider: Arc<dyn SchemeProvider>,
    /// Parameters newly created questionnaires are keyed under. Existing
    /// questionnaires always use their own stored parameters.
    default_params: CryptoParams,
    gate: SubmissionGate,
    revealer: ResultRevealer,
}

impl QuestionnaireService {
    /// Creates the service over the given store and scheme provider.
    #[must_use]
    pub fn new(
        store: SqliteStore,
        provider: Arc<dyn SchemeProvider>,
        default_params: CryptoParams,
    ) -> Self {
        let gate = SubmissionGate::new(store.clone(), provider.clone());
        let revealer = ResultRevealer::new(store.clone(), provider.clone());
        Self {
            store,
            provider,
            default_params,
            gate,
            revealer,
        }
    }

    /// Creates a questionnaire: validates the request, generates a fresh
    /// keypair, and persists everything.
    pub fn create(&self, request: &CreateRequest) -> Result<CreatedQuestionnaire, PollError> {
        if request.questions.is_empty() {
            return Err(PollError::Validation {
                field: "questions".to_string(),
                reason: "questionnaire must have at least one question".to_string(),
            });
        }
        for (i, question) in request.questions.iter().enumerate() {
            question.validate(i)?;
        }
        let now = Utc::now();
        if request.deadline <= now {
            return Err(PollError::Validation {
                field: "deadline".to_string(),
                reason: format!("deadline {} is not in the future", request.deadline),
            });
        }
        let link = match &request.link {
            Some(custom) => validate_link(custom)?,
            None => Uuid::new_v4().simple().to_string(),
        };

        let scheme = self
            .provider
            .scheme_for(self.default_params)
            .map_err(|e| PollError::Internal(format!("unusable cipher parameters: {e}")))?;
        let keys = scheme
            .generate_keypair()
            .map_err(|e| PollError::Internal(format!("key generation failed: {e}")))?;
        let secret_key_json = SecretString::from(
            serde_json::to_string(&keys.secret)
                .map_err(|e| PollError::Internal(format!("key serialization failed: {e}")))?,
        );

        self.store.insert_questionnaire(&NewQuestionnaire {
            link: &link,
            questions: &request.questions,
            deadline: request.deadline,
            params: self.default_params,
            public_key: &keys.public,
            secret_key_json,
            hide_results_until_deadline: request.hide_results_until_deadline,
            created_at: now,
        })?;

        info!(
            link = %link,
            questions = request.questions.len(),
            deadline = %request.deadline,
            "questionnaire created"
        );
        Ok(CreatedQuestionnaire {
            link,
            params: self.default_params,
            public_key: keys.public,
            deadline: request.deadline,
        })
    }

    /// Fetches a questionnaire for answering. Expired questionnaires are
    /// gone, not merely read-only.
    pub fn get(&self, link: &str) -> Result<QuestionnaireView, PollError> {
        let q = self.store.get_by_link(link)?;
        if q.is_expired(Utc::now()) {
            return Err(PollError::Expired {
                link: q.link,
                deadline: q.deadline,
            });
        }
        Ok(QuestionnaireView {
            link: q.link,
            questions: q.questions,
            deadline: q.deadline,
            params: q.params,
            public_key: q.public_key,
            hide_results_until_deadline: q.hide_results_until_deadline,
            created_at: q.created_at,
        })
    }

    /// Submits one ballot; see [`SubmissionGate::submit`].
    pub fn submit(
        &self,
        link: &str,
        fingerprint: Option<&str>,
        ballot: &[CiphertextWire],
    ) -> Result<u64, PollError> {
        self.gate.submit(link, fingerprint, ballot)
    }

    /// Lightweight statistics. Available for expired questionnaires too.
    pub fn stats(&self, link: &str) -> Result<QuestionnaireStats, PollError> {
        let q = self.store.get_by_link(link)?;
        let is_expired = q.is_expired(Utc::now());
        Ok(QuestionnaireStats {
            link: q.link,
            response_count: q.response_count,
            deadline: q.deadline,
            created_at: q.created_at,
            is_expired,
        })
    }

    /// Revealed results; see [`ResultRevealer::reveal`].
    pub fn results(&self, link: &str) -> Result<TallyResult, PollError> {
        self.revealer.reveal(link)
    }

    /// All questionnaires, newest first.
    pub fn list(&self) -> Result<Vec<QuestionnaireSummary>, PollError> {
        let now = Utc::now();
        Ok(self
            .store
            .list()?
            .into_iter()
            .map(|row| QuestionnaireSummary {
                is_expired: now > row.deadline,
                link: row.link,
                created_at: row.created_at,
                deadline: row.deadline,
                response_count: row.response_count,
                question_count: row.question_count,
            })
            .collect())
    }

    /// Storage connectivity probe; returns the liveness timestamp.
    pub fn health(&self) -> Result<DateTime<Utc>, PollError> {
        self.store.ping()?;
        Ok(Utc::now())
    }
}

fn validate_link(custom: &str) -> Result<String, PollError> {
    let link = custom.trim();
    if link.is_empty() || link.len() > MAX_LINK_LEN {
        return Err(PollError::Validation {
            field: "link".to_string(),
            reason: format!("custom link must be 1 to {MAX_LINK_LEN} characters"),
        });
    }
    if !link
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(PollError::Validation {
            field: "link".to_string(),
            reason: "custom link may only contain letters, digits, '-' and '_'".to_string(),
        });
    }
    Ok(link.to_string())
}
