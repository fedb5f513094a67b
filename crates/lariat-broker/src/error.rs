//! Broker error types.

use lariat_messages::MessageError;
use lariat_resources::ResourceError;
use thiserror::Error;

/// Broker error type.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Topic or queue already exists
    #[error("Resource already exists: {0}")]
    ResourceAlreadyExists(String),

    /// Topic, queue, or subscription not found
    #[error("Resource does not exist: {0}")]
    ResourceDoesNotExist(String),

    /// The broker rejected or failed a publish
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Address could not be parsed
    #[error("Invalid resource: {0}")]
    InvalidResource(#[from] ResourceError),

    /// Message could not be encoded
    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    /// Client is not usable
    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias using BrokerError.
pub type BrokerResult<T> = Result<T, BrokerError>;
