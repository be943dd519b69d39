//! SQLite questionnaire store.
//!
//! All components read and write through this boundary; it dictates the
//! consistency contract:
//!
//! - Every multi-statement mutation runs inside an immediate transaction,
//!   so readers always observe both the accumulator update and the
//!   submission record, or neither.
//! - The `questionnaires.version` column is an optimistic counter. A stale
//!   writer's `UPDATE ... WHERE version = ?` affects zero rows and surfaces
//!   [`PollError::StorageConflict`], which the caller retries after
//!   re-reading. This serializes mutations per questionnaire; distinct
//!   questionnaires never contend beyond the connection lock.
//! - `UNIQUE(questionnaire_id, fingerprint)` on `submission_records` is the
//!   sole double-vote mechanism; violations map to
//!   [`PollError::DuplicateSubmission`].
//! - The secret key column is only read by [`SqliteStore::load_secret_key`]
//!   and returned wrapped in [`SecretString`]; no other query selects it.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings, which makes
//! lexicographic `<` comparisons in SQL agree with chronological order.

use std::fmt::Display;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use secrecy::{ExposeSecret, SecretString};

use hushpoll_core::model::{CryptoParams, Question, Questionnaire, SubmissionRecord};
use hushpoll_core::results::TallyResult;
use hushpoll_core::wire::{CiphertextWire, PublicKeyWire};
use hushpoll_core::PollError;

const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS questionnaires (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        link TEXT NOT NULL UNIQUE,
        deadline TEXT NOT NULL,
        questions_json TEXT NOT NULL,
        poly_degree INTEGER NOT NULL,
        plain_modulus INTEGER NOT NULL,
        ciph_modulus TEXT NOT NULL,
        public_key_json TEXT NOT NULL,
        secret_key_json TEXT NOT NULL,
        accumulator_json TEXT,
        decrypted_results_json TEXT,
        is_decrypted INTEGER NOT NULL DEFAULT 0,
        hide_results_until_deadline INTEGER NOT NULL DEFAULT 1,
        response_count INTEGER NOT NULL DEFAULT 0,
        version INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS submission_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        questionnaire_id INTEGER NOT NULL REFERENCES questionnaires(id),
        fingerprint TEXT NOT NULL,
        submitted_at TEXT NOT NULL,
        UNIQUE(questionnaire_id, fingerprint)
    );

    CREATE INDEX IF NOT EXISTS idx_submissions_questionnaire
        ON submission_records(questionnaire_id);
    CREATE INDEX IF NOT EXISTS idx_questionnaires_due
        ON questionnaires(is_decrypted, deadline);
";

/// Columns selected when materializing a [`Questionnaire`]. The secret key
/// is deliberately absent.
const QUESTIONNAIRE_COLUMNS: &str = "id, link, deadline, questions_json, poly_degree, \
     plain_modulus, ciph_modulus, public_key_json, accumulator_json, \
     decrypted_results_json, is_decrypted, hide_results_until_deadline, \
     response_count, version, created_at";

/// Fields needed to persist a new questionnaire.
pub struct NewQuestionnaire<'a> {
    /// Unique link token.
    pub link: &'a str,
    /// Validated question list.
    pub questions: &'a [Question],
    /// UTC deadline.
    pub deadline: DateTime<Utc>,
    /// Cipher parameters.
    pub params: CryptoParams,
    /// Public key blob.
    pub public_key: &'a PublicKeyWire,
    /// Serialized secret key, wrapped until it hits the column.
    pub secret_key_json: SecretString,
    /// Visibility flag.
    pub hide_results_until_deadline: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Durable questionnaire store backed by SQLite.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and ensures the
    /// schema exists.
    pub fn open(path: &Path) -> Result<Self, PollError> {
        let conn = Connection::open(path).map_err(internal)?;
        Self::with_connection(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, PollError> {
        let conn = Connection::open_in_memory().map_err(internal)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, PollError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(internal)?;
        conn.execute_batch(SCHEMA_SQL).map_err(internal)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, PollError> {
        self.conn
            .lock()
            .map_err(|_| PollError::Internal("connection lock poisoned".to_string()))
    }

    /// Inserts a new questionnaire and returns its storage id.
    ///
    /// A link collision maps to a validation error so the caller can tell
    /// the client to pick another custom link.
    pub fn insert_questionnaire(&self, new: &NewQuestionnaire<'_>) -> Result<i64, PollError> {
        let conn = self.lock()?;
        let questions_json = serde_json::to_string(new.questions).map_err(internal)?;
        let public_key_json = serde_json::to_string(new.public_key).map_err(internal)?;

        let result = conn.execute(
            "INSERT INTO questionnaires (link, deadline, questions_json, poly_degree, \
             plain_modulus, ciph_modulus, public_key_json, secret_key_json, \
             hide_results_until_deadline, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                new.link,
                encode_ts(new.deadline),
                questions_json,
                new.params.poly_degree as i64,
                new.params.plain_modulus as i64,
                new.params.ciph_modulus.to_string(),
                public_key_json,
                new.secret_key_json.expose_secret(),
                i64::from(new.hide_results_until_deadline),
                encode_ts(new.created_at),
            ],
        );
        match result {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => Err(PollError::Validation {
                field: "link".to_string(),
                reason: format!("link already exists: {}", new.link),
            }),
            Err(e) => Err(internal(e)),
        }
    }

    /// Loads a questionnaire by link, without its secret key.
    pub fn get_by_link(&self, link: &str) -> Result<Questionnaire, PollError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {QUESTIONNAIRE_COLUMNS} FROM questionnaires WHERE link = ?1"),
            params![link],
            row_to_questionnaire,
        )
        .optional()
        .map_err(internal)?
        .ok_or_else(|| PollError::NotFound {
            link: link.to_string(),
        })
    }

    /// Loads the serialized secret key for a questionnaire.
    ///
    /// Callers must keep the returned value scoped to the reveal operation;
    /// it is never logged or returned by any read surface.
    pub fn load_secret_key(&self, id: i64) -> Result<SecretString, PollError> {
        let conn = self.lock()?;
        let json: String = conn
            .query_row(
                "SELECT secret_key_json FROM questionnaires WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .map_err(internal)?;
        Ok(SecretString::from(json))
    }

    /// Applies an accepted submission as one atomic unit: writes the merged
    /// accumulator, increments the response counter, and inserts the
    /// submission record. Returns the new response count.
    ///
    /// The update is guarded by the optimistic version the questionnaire
    /// was read at; a concurrent writer winning the race surfaces
    /// [`PollError::StorageConflict`] and nothing is applied.
    pub fn apply_submission(
        &self,
        questionnaire: &Questionnaire,
        accumulator: &[CiphertextWire],
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, PollError> {
        let accumulator_json = serde_json::to_string(accumulator).map_err(internal)?;
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(internal)?;

        let changed = tx
            .execute(
                "UPDATE questionnaires \
                 SET accumulator_json = ?1, response_count = response_count + 1, \
                     version = version + 1 \
                 WHERE id = ?2 AND version = ?3",
                params![accumulator_json, questionnaire.id, questionnaire.version],
            )
            .map_err(internal)?;
        if changed == 0 {
            // Dropping the transaction rolls back.
            return Err(PollError::StorageConflict {
                link: questionnaire.link.clone(),
            });
        }

        let inserted = tx.execute(
            "INSERT INTO submission_records (questionnaire_id, fingerprint, submitted_at) \
             VALUES (?1, ?2, ?3)",
            params![questionnaire.id, fingerprint, encode_ts(now)],
        );
        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                return Err(PollError::DuplicateSubmission {
                    link: questionnaire.link.clone(),
                });
            }
            return Err(internal(e));
        }

        let count: i64 = tx
            .query_row(
                "SELECT response_count FROM questionnaires WHERE id = ?1",
                params![questionnaire.id],
                |row| row.get(0),
            )
            .map_err(internal)?;
        tx.commit().map_err(internal)?;
        Ok(count as u64)
    }

    /// Whether an identity has already submitted to a questionnaire.
    pub fn has_submission(&self, questionnaire_id: i64, fingerprint: &str) -> Result<bool, PollError> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM submission_records \
                 WHERE questionnaire_id = ?1 AND fingerprint = ?2",
                params![questionnaire_id, fingerprint],
                |row| row.get(0),
            )
            .optional()
            .map_err(internal)?;
        Ok(found.is_some())
    }

    /// Number of submission records for a questionnaire. Equals the
    /// questionnaire's `response_count` by invariant.
    pub fn count_submissions(&self, questionnaire_id: i64) -> Result<u64, PollError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM submission_records WHERE questionnaire_id = ?1",
                params![questionnaire_id],
                |row| row.get(0),
            )
            .map_err(internal)?;
        Ok(count as u64)
    }

    /// Persists the revealed tally, guarded so only the first writer wins
    /// and only if the questionnaire is still at the version the tally was
    /// decrypted from.
    ///
    /// The version guard matters: a ballot that passed the deadline check
    /// just before expiry can commit between the revealer's read and its
    /// persist. Without the guard that tally (missing the late ballot)
    /// would be frozen as final.
    ///
    /// Returns `true` if this call performed the write, `false` if the
    /// guard failed; the caller re-reads to tell a finished reveal from a
    /// moved version.
    pub fn persist_reveal(
        &self,
        id: i64,
        expected_version: i64,
        results: &TallyResult,
    ) -> Result<bool, PollError> {
        let results_json = serde_json::to_string(results).map_err(internal)?;
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE questionnaires \
                 SET decrypted_results_json = ?1, is_decrypted = 1, version = version + 1 \
                 WHERE id = ?2 AND is_decrypted = 0 AND version = ?3",
                params![results_json, id, expected_version],
            )
            .map_err(internal)?;
        Ok(changed == 1)
    }

    /// Links of questionnaires the sweeper should reveal: expired,
    /// un-revealed, with at least one response.
    pub fn find_due_for_reveal(&self, now: DateTime<Utc>) -> Result<Vec<String>, PollError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT link FROM questionnaires \
                 WHERE is_decrypted = 0 AND response_count > 0 AND deadline < ?1 \
                 ORDER BY deadline ASC",
            )
            .map_err(internal)?;
        let links = stmt
            .query_map(params![encode_ts(now)], |row| row.get::<_, String>(0))
            .map_err(internal)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(internal)?;
        Ok(links)
    }

    /// Submission records for a questionnaire, oldest first. Fingerprints
    /// are opaque and never linkable to ballot contents.
    pub fn submissions(&self, questionnaire_id: i64) -> Result<Vec<SubmissionRecord>, PollError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT questionnaire_id, fingerprint, submitted_at FROM submission_records \
                 WHERE questionnaire_id = ?1 ORDER BY submitted_at ASC, id ASC",
            )
            .map_err(internal)?;
        let rows = stmt
            .query_map(params![questionnaire_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(internal)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(internal)?;
        rows.into_iter()
            .map(|(id, fingerprint, submitted_at)| {
                Ok(SubmissionRecord {
                    questionnaire_id: id,
                    fingerprint,
                    submitted_at: decode_ts(&submitted_at)?,
                })
            })
            .collect()
    }

    /// Cheap connectivity probe for health checks.
    pub fn ping(&self) -> Result<(), PollError> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(internal)?;
        Ok(())
    }

    /// All questionnaires, newest first, as raw listing rows.
    pub fn list(&self) -> Result<Vec<ListingRow>, PollError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT link, created_at, deadline, response_count, questions_json \
                 FROM questionnaires ORDER BY created_at DESC",
            )
            .map_err(internal)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(internal)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(internal)?;

        rows.into_iter()
            .map(|(link, created_at, deadline, response_count, questions_json)| {
                let questions: Vec<Question> =
                    serde_json::from_str(&questions_json).map_err(internal)?;
                Ok(ListingRow {
                    link,
                    created_at: decode_ts(&created_at)?,
                    deadline: decode_ts(&deadline)?,
                    response_count: response_count as u64,
                    question_count: questions.len(),
                })
            })
            .collect()
    }
}

/// One row of the listing query.
#[derive(Debug, Clone)]
pub struct ListingRow {
    /// Link token.
    pub link: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Deadline.
    pub deadline: DateTime<Utc>,
    /// Accepted submission count.
    pub response_count: u64,
    /// Number of questions.
    pub question_count: usize,
}

fn row_to_questionnaire(row: &rusqlite::Row<'_>) -> rusqlite::Result<Questionnaire> {
    let deadline: String = row.get(2)?;
    let questions_json: String = row.get(3)?;
    let ciph_modulus: String = row.get(6)?;
    let public_key_json: String = row.get(7)?;
    let accumulator_json: Option<String> = row.get(8)?;
    let decrypted_json: Option<String> = row.get(9)?;
    let created_at: String = row.get(14)?;

    let column_err =
        |idx: usize, e: Box<dyn std::error::Error + Send + Sync>| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e)
        };

    Ok(Questionnaire {
        id: row.get(0)?,
        link: row.get(1)?,
        deadline: parse_ts_sql(&deadline, 2)?,
        questions: serde_json::from_str(&questions_json)
            .map_err(|e| column_err(3, Box::new(e)))?,
        params: CryptoParams {
            poly_degree: row.get::<_, i64>(4)? as usize,
            plain_modulus: row.get::<_, i64>(5)? as u64,
            ciph_modulus: ciph_modulus
                .parse::<u64>()
                .map_err(|e| column_err(6, Box::new(e)))?,
        },
        public_key: serde_json::from_str(&public_key_json)
            .map_err(|e| column_err(7, Box::new(e)))?,
        accumulator: accumulator_json
            .map(|json| serde_json::from_str::<Vec<CiphertextWire>>(&json))
            .transpose()
            .map_err(|e| column_err(8, Box::new(e)))?,
        decrypted_results: decrypted_json
            .map(|json| serde_json::from_str::<TallyResult>(&json))
            .transpose()
            .map_err(|e| column_err(9, Box::new(e)))?,
        is_decrypted: row.get::<_, i64>(10)? != 0,
        hide_results_until_deadline: row.get::<_, i64>(11)? != 0,
        response_count: row.get::<_, i64>(12)? as u64,
        version: row.get(13)?,
        created_at: parse_ts_sql(&created_at, 14)?,
    })
}

fn parse_ts_sql(value: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Fixed-width RFC 3339 UTC, so string order equals time order.
fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(value: &str) -> Result<DateTime<Utc>, PollError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(internal)
}

fn internal(e: impl Display) -> PollError {
    PollError::Internal(format!("storage: {e}"))
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use hushpoll_core::wire::PolynomialWire;

    use super::*;

    fn poly(coeffs: Vec<i64>) -> PolynomialWire {
        PolynomialWire {
            ring_degree: coeffs.len(),
            coeffs,
        }
    }

    fn ciphertext(seed: i64) -> CiphertextWire {
        CiphertextWire {
            c0: poly(vec![seed, seed + 1]),
            c1: poly(vec![seed + 2, seed + 3]),
            scaling_factor: 10,
            modulus: 100,
        }
    }

    fn questions() -> Vec<Question> {
        vec![Question {
            prompt: "Lunch venue?".to_string(),
            options: (0..8).map(|i| format!("venue-{i}")).collect(),
        }]
    }

    fn public_key() -> PublicKeyWire {
        PublicKeyWire {
            p0: poly(vec![1, 2]),
            p1: poly(vec![3, 4]),
        }
    }

    fn insert(store: &SqliteStore, link: &str, deadline: DateTime<Utc>) -> i64 {
        let qs = questions();
        let pk = public_key();
        store
            .insert_questionnaire(&NewQuestionnaire {
                link,
                questions: &qs,
                deadline,
                params: CryptoParams::default(),
                public_key: &pk,
                secret_key_json: SecretString::from("{\"ring_degree\":2,\"coeffs\":[0,1]}"),
                hide_results_until_deadline: true,
                created_at: Utc::now(),
            })
            .unwrap()
    }

    #[test]
    fn round_trips_a_questionnaire() {
        let store = SqliteStore::open_in_memory().unwrap();
        let deadline = Utc::now() + Duration::hours(1);
        insert(&store, "lunch", deadline);

        let q = store.get_by_link("lunch").unwrap();
        assert_eq!(q.link, "lunch");
        assert_eq!(q.questions, questions());
        assert_eq!(q.response_count, 0);
        assert_eq!(q.version, 0);
        assert!(q.accumulator.is_none());
        assert!(!q.is_decrypted);
        assert!(q.hide_results_until_deadline);
        // Microsecond precision survives the column round trip.
        assert_eq!(q.deadline.timestamp_micros(), deadline.timestamp_micros());
    }

    #[test]
    fn unknown_link_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            store.get_by_link("missing"),
            Err(PollError::NotFound { .. })
        ));
    }

    #[test]
    fn duplicate_link_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let deadline = Utc::now() + Duration::hours(1);
        insert(&store, "lunch", deadline);
        let qs = questions();
        let pk = public_key();
        let err = store
            .insert_questionnaire(&NewQuestionnaire {
                link: "lunch",
                questions: &qs,
                deadline,
                params: CryptoParams::default(),
                public_key: &pk,
                secret_key_json: SecretString::from("{}"),
                hide_results_until_deadline: true,
                created_at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, PollError::Validation { .. }));
    }

    #[test]
    fn submission_applies_atomically() {
        let store = SqliteStore::open_in_memory().unwrap();
        insert(&store, "lunch", Utc::now() + Duration::hours(1));
        let q = store.get_by_link("lunch").unwrap();

        let count = store
            .apply_submission(&q, &[ciphertext(1)], "fp-1", Utc::now())
            .unwrap();
        assert_eq!(count, 1);

        let q = store.get_by_link("lunch").unwrap();
        assert_eq!(q.response_count, 1);
        assert_eq!(q.version, 1);
        assert!(q.accumulator.is_some());
        assert_eq!(store.count_submissions(q.id).unwrap(), 1);

        let records = store.submissions(q.id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fingerprint, "fp-1");
        assert_eq!(records[0].questionnaire_id, q.id);
    }

    #[test]
    fn stale_version_is_a_conflict_and_applies_nothing() {
        let store = SqliteStore::open_in_memory().unwrap();
        insert(&store, "lunch", Utc::now() + Duration::hours(1));
        let stale = store.get_by_link("lunch").unwrap();

        store
            .apply_submission(&stale, &[ciphertext(1)], "fp-1", Utc::now())
            .unwrap();

        // Second writer still holds version 0.
        let err = store
            .apply_submission(&stale, &[ciphertext(2)], "fp-2", Utc::now())
            .unwrap_err();
        assert!(matches!(err, PollError::StorageConflict { .. }));

        let q = store.get_by_link("lunch").unwrap();
        assert_eq!(q.response_count, 1);
        assert_eq!(store.count_submissions(q.id).unwrap(), 1);
    }

    #[test]
    fn duplicate_fingerprint_rolls_back_the_tally_update() {
        let store = SqliteStore::open_in_memory().unwrap();
        insert(&store, "lunch", Utc::now() + Duration::hours(1));
        let q = store.get_by_link("lunch").unwrap();
        store
            .apply_submission(&q, &[ciphertext(1)], "fp-1", Utc::now())
            .unwrap();

        let fresh = store.get_by_link("lunch").unwrap();
        let before = fresh.accumulator.clone();
        let err = store
            .apply_submission(&fresh, &[ciphertext(9)], "fp-1", Utc::now())
            .unwrap_err();
        assert!(matches!(err, PollError::DuplicateSubmission { .. }));

        // The accumulator update inside the failed transaction rolled back.
        let after = store.get_by_link("lunch").unwrap();
        assert_eq!(after.accumulator, before);
        assert_eq!(after.response_count, 1);
        assert_eq!(after.version, fresh.version);
    }

    #[test]
    fn reveal_persists_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        insert(&store, "lunch", Utc::now() - Duration::hours(1));
        let q = store.get_by_link("lunch").unwrap();

        let tally = TallyResult {
            link: "lunch".to_string(),
            created_at: q.created_at,
            deadline: q.deadline,
            response_count: 1,
            results: vec![],
        };
        assert!(store.persist_reveal(q.id, q.version, &tally).unwrap());
        let revealed = store.get_by_link("lunch").unwrap();
        assert!(!store
            .persist_reveal(q.id, revealed.version, &tally)
            .unwrap());

        assert!(revealed.is_decrypted);
        assert!(revealed.decrypted_results.is_some());
    }

    #[test]
    fn reveal_guard_rejects_a_stale_version() {
        let store = SqliteStore::open_in_memory().unwrap();
        insert(&store, "lunch", Utc::now() - Duration::hours(1));
        let stale = store.get_by_link("lunch").unwrap();

        // A ballot lands after the revealer's read, bumping the version.
        store
            .apply_submission(&stale, &[ciphertext(1)], "fp-late", Utc::now())
            .unwrap();

        let tally = TallyResult {
            link: "lunch".to_string(),
            created_at: stale.created_at,
            deadline: stale.deadline,
            response_count: 0,
            results: vec![],
        };
        assert!(!store.persist_reveal(stale.id, stale.version, &tally).unwrap());

        // The late ballot was not frozen out.
        let fresh = store.get_by_link("lunch").unwrap();
        assert!(!fresh.is_decrypted);
        assert_eq!(fresh.response_count, 1);
        assert!(store.persist_reveal(fresh.id, fresh.version, &tally).unwrap());
    }

    #[test]
    fn due_query_filters_on_expiry_responses_and_decryption() {
        let store = SqliteStore::open_in_memory().unwrap();
        let past = Utc::now() - Duration::hours(1);
        let future = Utc::now() + Duration::hours(1);

        insert(&store, "due", past);
        insert(&store, "not-expired", future);
        insert(&store, "empty", past);
        insert(&store, "done", past);

        // "due" and "done" get a response; "done" is then revealed.
        for link in ["due", "done"] {
            let q = store.get_by_link(link).unwrap();
            store
                .apply_submission(&q, &[ciphertext(1)], "fp-1", Utc::now())
                .unwrap();
        }
        let done = store.get_by_link("done").unwrap();
        let tally = TallyResult {
            link: "done".to_string(),
            created_at: done.created_at,
            deadline: done.deadline,
            response_count: 1,
            results: vec![],
        };
        store.persist_reveal(done.id, done.version, &tally).unwrap();

        let due = store.find_due_for_reveal(Utc::now()).unwrap();
        assert_eq!(due, vec!["due".to_string()]);
    }

    #[test]
    fn listing_is_newest_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        let qs = questions();
        let pk = public_key();
        for (i, link) in ["first", "second"].iter().enumerate() {
            store
                .insert_questionnaire(&NewQuestionnaire {
                    link,
                    questions: &qs,
                    deadline: Utc::now() + Duration::hours(1),
                    params: CryptoParams::default(),
                    public_key: &pk,
                    secret_key_json: SecretString::from("{}"),
                    hide_results_until_deadline: true,
                    created_at: Utc::now() + Duration::seconds(i as i64),
                })
                .unwrap();
        }
        let rows = store.list().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].link, "second");
        assert_eq!(rows[1].link, "first");
        assert_eq!(rows[0].question_count, 1);
    }
}
