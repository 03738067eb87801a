use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no row with id {0}")]
    NotFound(i64),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("order link encoding error: {0}")]
    Json(#[from] serde_json::Error),
}
