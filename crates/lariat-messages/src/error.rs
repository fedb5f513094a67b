//! Message error types.

use lariat_core::MessageKind;
use std::fmt;
use thiserror::Error;

/// One failing field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every failing field of a message, in check order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub(crate) fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Whether any error concerns `field`.
    pub fn contains(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    pub fn fields(&self) -> Vec<&'static str> {
        self.0.iter().map(|e| e.field).collect()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum MessageError {
    /// Field validation failed.
    #[error("Invalid message: {errors}")]
    InvalidMessage { errors: FieldErrors },

    /// Kind tag is neither `event` nor `command`.
    #[error("Unknown message kind: {0:?}")]
    UnknownMessageKind(String),

    /// No schema exists for this version of the resolved kind.
    #[error("Unknown message version {version} for {kind}")]
    UnknownMessageVersion { kind: MessageKind, version: String },

    /// Payload is valid JSON but not an object.
    #[error("Message payload is not a JSON object")]
    NotAnObject,

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type MessageResult<T> = Result<T, MessageError>;
