//! Inbox error types.

use crate::HandlerError;
use thiserror::Error;

/// Inbox error type.
#[derive(Error, Debug)]
pub enum InboxError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] lariat_database::DatabaseError),

    /// Message could not be built or failed validation
    #[error("Message error: {0}")]
    Message(#[from] lariat_messages::MessageError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The handler failed in a way that should trigger redelivery
    #[error("Handler failed: {0}")]
    Handler(HandlerError),

    /// Message uuid is not a UUID
    #[error("Invalid message id: {0}")]
    InvalidId(String),
}

/// Result type alias using InboxError.
pub type InboxResult<T> = Result<T, InboxError>;
