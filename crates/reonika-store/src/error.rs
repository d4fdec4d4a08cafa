use reonika_shared::ReonikaError;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// The requester is not allowed to touch the row (row-level security).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Input rejected before it reached the database.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for ReonikaError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ReonikaError::NotFound("record not found".into()),
            StoreError::PermissionDenied(msg) => ReonikaError::PermissionDenied(msg),
            StoreError::Validation(msg) => ReonikaError::Validation(msg),
            other => ReonikaError::NetworkFailure(other.to_string()),
        }
    }
}
