//! Shared fixtures for the integration suites: a file-backed deployment in
//! a temp directory, ballot construction, and a deadline time-travel helper
//! that edits the stored deadline directly (the service itself refuses to
//! create questionnaires that are already expired).

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use tempfile::TempDir;

use hushpoll_core::model::{CryptoParams, Question};
use hushpoll_core::scheme::{BfvProvider, BfvScheme, CipherScheme, SchemeProvider};
use hushpoll_core::wire::{CiphertextWire, PublicKeyWire};
use hushpoll_daemon::service::{CreateRequest, CreatedQuestionnaire};
use hushpoll_daemon::{QuestionnaireService, SqliteStore};

pub struct Deployment {
    // Held for its Drop; removing the directory tears the deployment down.
    _dir: TempDir,
    pub db_path: PathBuf,
    pub store: SqliteStore,
    pub scheme: Arc<BfvScheme>,
    pub provider: Arc<dyn SchemeProvider>,
    pub service: QuestionnaireService,
}

pub fn deployment() -> Deployment {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("questionnaires.db");
    let store = SqliteStore::open(&db_path).unwrap();
    let scheme = Arc::new(BfvScheme::new(CryptoParams::default()).unwrap());
    let provider: Arc<dyn SchemeProvider> = Arc::new(BfvProvider::new());
    let service =
        QuestionnaireService::new(store.clone(), provider.clone(), CryptoParams::default());
    Deployment {
        _dir: dir,
        db_path,
        store,
        scheme,
        provider,
        service,
    }
}

pub fn questions(n: usize) -> Vec<Question> {
    (0..n)
        .map(|i| Question {
            prompt: format!("Question {i}?"),
            options: vec![
                "mon".into(),
                "tue".into(),
                "wed".into(),
                "thu".into(),
                "fri".into(),
                "sat".into(),
                "sun".into(),
                "N/A".into(),
            ],
        })
        .collect()
}

pub fn create(
    dep: &Deployment,
    link: &str,
    question_count: usize,
    hide: bool,
    deadline: DateTime<Utc>,
) -> CreatedQuestionnaire {
    dep.service
        .create(&CreateRequest {
            questions: questions(question_count),
            deadline,
            link: Some(link.to_string()),
            hide_results_until_deadline: hide,
        })
        .unwrap()
}

pub fn one_hot(slot: usize) -> [u64; 8] {
    let mut v = [0u64; 8];
    v[slot] = 1;
    v
}

pub fn ballot(
    dep: &Deployment,
    public_key: &PublicKeyWire,
    votes: &[[u64; 8]],
) -> Vec<CiphertextWire> {
    votes
        .iter()
        .map(|v| {
            let plain = dep.scheme.encode(v).unwrap();
            dep.scheme.encrypt(&plain, public_key).unwrap()
        })
        .collect()
}

/// Rewrites a questionnaire's stored deadline to one hour in the past.
pub fn expire(db_path: &Path, link: &str) {
    let past = (Utc::now() - Duration::hours(1)).to_rfc3339_opts(SecondsFormat::Micros, true);
    let conn = Connection::open(db_path).unwrap();
    let changed = conn
        .execute(
            "UPDATE questionnaires SET deadline = ?1 WHERE link = ?2",
            params![past, link],
        )
        .unwrap();
    assert_eq!(changed, 1, "no questionnaire with link {link}");
}
