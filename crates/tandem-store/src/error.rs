use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("No platform data directory available")]
    NoDataDir,

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    /// The addressed row does not exist.
    #[error("Not found")]
    NotFound,

    /// A unique index rejected the write. Carries what collided.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    /// A stored row that no longer decodes (bad id, timestamp or content).
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Classify a failed INSERT/UPDATE: constraint violations become
    /// [`StoreError::Conflict`] labelled with `what`.
    pub(crate) fn from_write(err: rusqlite::Error, what: &str) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => StoreError::Conflict(what.to_string()),
            _ => StoreError::Sqlite(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
