//! Outbox error types.

use thiserror::Error;

/// Outbox error type.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] lariat_database::DatabaseError),

    /// Message failed validation or could not be encoded
    #[error("Message error: {0}")]
    Message(#[from] lariat_messages::MessageError),

    /// The operation needs a SQLite-backed repository
    #[error("Outbox repository is not backed by SQLite")]
    SqliteRequired,

    /// Resend period must be non-zero
    #[error("Resend period must be non-zero")]
    InvalidPeriod,

    /// Message uuid is not a UUID
    #[error("Invalid message id: {0}")]
    InvalidId(String),
}

/// Result type alias using OutboxError.
pub type OutboxResult<T> = Result<T, OutboxError>;
