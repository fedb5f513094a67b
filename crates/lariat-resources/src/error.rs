//! Resource naming errors.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Name, ARN, or URL that cannot be turned into a resource.
    #[error("Invalid resource format: {0}")]
    InvalidResourceFormat(String),
}

pub type ResourceResult<T> = Result<T, ResourceError>;
