//! Shared types, configuration, and logging for the lariat workspace.
//!
//! Every other crate takes a [`Config`] in its constructors instead of reading
//! process-wide defaults, so two differently configured publishers can live in
//! the same process.

mod config;
mod error;
mod kind;
mod logging;

pub use config::{
    Config, StorageConfig, StorageDriver, DEFAULT_LOG_LEVEL, DEFAULT_REGION,
    DEFAULT_RESEND_TIMEOUT_SECS, DEFAULT_VERSION, SUPPORTED_VERSIONS,
};
pub use error::{CoreError, CoreResult};
pub use kind::MessageKind;
pub use logging::{init_logging, init_logging_json, parse_level};
