//! Database error types.

use thiserror::Error;

/// Database error type.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A row with this uuid already exists
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Connection could not be used
    #[error("Connection error: {0}")]
    Connection(String),

    /// Schema cannot be migrated
    #[error("Migration error: {0}")]
    Migration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using DatabaseError.
pub type DatabaseResult<T> = Result<T, DatabaseError>;
