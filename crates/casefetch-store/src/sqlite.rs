//! SQLite store for successful case records and raw-HTML audit artifacts.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use casefetch_core::{CaseQuery, CaseRecord};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

use crate::StoreError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS query_log (
    id          INTEGER PRIMARY KEY,
    court_id    TEXT NOT NULL,
    case_type   TEXT NOT NULL,
    case_number TEXT NOT NULL,
    filing_year INTEGER NOT NULL,
    queried_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS case_records (
    id                INTEGER PRIMARY KEY,
    query_id          INTEGER,
    case_title        TEXT NOT NULL,
    petitioner        TEXT NOT NULL,
    respondent        TEXT NOT NULL,
    filing_date       TEXT NOT NULL,
    next_hearing_date TEXT NOT NULL,
    case_status       TEXT NOT NULL,
    order_links       TEXT NOT NULL,
    saved_at          TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS audit_artifacts (
    id         INTEGER PRIMARY KEY,
    query_id   INTEGER,
    raw_body   TEXT,
    reason     TEXT NOT NULL,
    created_at TEXT NOT NULL
);
";

/// A stored case record, as handed back to the presentation layer.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub id: i64,
    pub query_id: Option<i64>,
    pub record: CaseRecord,
    pub saved_at: String,
}

/// A persisted raw response (or its absence) kept for manual review.
#[derive(Debug, Clone)]
pub struct AuditArtifact {
    pub id: i64,
    pub query_id: Option<i64>,
    pub raw_body: Option<String>,
    pub reason: String,
    pub created_at: String,
}

/// SQLite-backed store.
///
/// Supports both in-memory (ephemeral) and persistent (file-backed) modes;
/// use [`open`](Self::open) for tests and [`open_persistent`](Self::open_persistent)
/// for storage that survives process restarts. Every save is a single
/// INSERT under the connection lock, so a run never leaves a partially
/// written row visible.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open an in-memory database.
    pub fn open() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open or create a database file at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Record an authorized query before it is sent to the portal.
    pub fn log_query(&self, query: &CaseQuery) -> Result<i64, StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO query_log (court_id, case_type, case_number, filing_year, queried_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                query.court_id,
                query.case_type,
                query.case_number,
                query.filing_year,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Persist a successful case record, returning its id.
    pub fn save_record(
        &self,
        query_id: Option<i64>,
        record: &CaseRecord,
    ) -> Result<i64, StoreError> {
        let links = serde_json::to_string(&record.order_links)?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO case_records (query_id, case_title, petitioner, respondent,
                                       filing_date, next_hearing_date, case_status,
                                       order_links, saved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                query_id,
                record.case_title,
                record.petitioner,
                record.respondent,
                record.filing_date,
                record.next_hearing_date,
                record.case_status,
                links,
                Utc::now().to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        info!(record_id = id, "case record saved");
        Ok(id)
    }

    /// Persist a raw response body (or its absence) with a failure reason.
    pub fn save_audit(
        &self,
        query_id: Option<i64>,
        raw_body: Option<&str>,
        reason: &str,
    ) -> Result<i64, StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO audit_artifacts (query_id, raw_body, reason, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![query_id, raw_body, reason, Utc::now().to_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();
        info!(audit_ref = id, reason, "audit artifact saved");
        Ok(id)
    }

    /// Fetch a stored record by id.
    pub fn get_record(&self, id: i64) -> Result<StoredRecord, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT query_id, case_title, petitioner, respondent, filing_date,
                        next_hearing_date, case_status, order_links, saved_at
                 FROM case_records WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, Option<i64>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                    ))
                },
            )
            .optional()?
            .ok_or(StoreError::NotFound(id))?;

        let (query_id, title, pet, resp, filed, next, status, links, saved_at) = row;
        Ok(StoredRecord {
            id,
            query_id,
            record: CaseRecord {
                case_title: title,
                petitioner: pet,
                respondent: resp,
                filing_date: filed,
                next_hearing_date: next,
                case_status: status,
                order_links: serde_json::from_str(&links)?,
            },
            saved_at,
        })
    }

    /// Fetch an audit artifact by id.
    pub fn get_audit(&self, id: i64) -> Result<AuditArtifact, StoreError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT query_id, raw_body, reason, created_at
             FROM audit_artifacts WHERE id = ?1",
            params![id],
            |row| {
                Ok(AuditArtifact {
                    id,
                    query_id: row.get(0)?,
                    raw_body: row.get(1)?,
                    reason: row.get(2)?,
                    created_at: row.get(3)?,
                })
            },
        )
        .optional()?
        .ok_or(StoreError::NotFound(id))
    }

    /// Number of stored case records.
    pub fn record_count(&self) -> Result<usize, StoreError> {
        self.count("case_records")
    }

    /// Number of stored audit artifacts.
    pub fn audit_count(&self) -> Result<usize, StoreError> {
        self.count("audit_artifacts")
    }

    fn count(&self, table: &str) -> Result<usize, StoreError> {
        let conn = self.lock();
        let n: i64 =
            conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A poisoned lock still guards a usable connection; keep serving.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}
