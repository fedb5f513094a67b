//! Business logic port.

use async_trait::async_trait;
use lariat_messages::{ClientError, Message};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandlerError {
    /// Business-rule failure. Recorded on the message; not retried.
    #[error("Client error: {0}")]
    Client(ClientError),

    /// Anything else. The message stays unprocessed so the broker redelivers it.
    #[error("{0}")]
    Fatal(String),
}

impl HandlerError {
    pub fn client(message: impl Into<String>) -> Self {
        Self::Client(ClientError::new(message))
    }

    pub fn fatal(error: impl fmt::Display) -> Self {
        Self::Fatal(error.to_string())
    }
}

impl From<ClientError> for HandlerError {
    fn from(error: ClientError) -> Self {
        Self::Client(error)
    }
}

/// Consumer business logic invoked by [`crate::InboxMiddleware`].
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle a validated message. Called at most once per uuid unless it
    /// fails with [`HandlerError::Fatal`].
    async fn handle(&self, message: &Message) -> Result<(), HandlerError>;

    /// Receive a body that could not be turned into a valid message.
    async fn handle_raw(&self, _body: &str) -> Result<(), HandlerError> {
        Ok(())
    }
}
