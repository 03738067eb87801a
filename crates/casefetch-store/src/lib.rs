//! Storage layer: SQLite tables for case records, audit artifacts, and the
//! query log.

mod error;
pub use error::StoreError;

mod sqlite;
pub use sqlite::{AuditArtifact, SqliteStore, StoredRecord};
