//! Versioned message envelope.
//!
//! A [`Message`] is an event or command at schema version 1 or 2. Messages are
//! never validated implicitly: build one from fields or from a wire payload,
//! then call [`Message::validate`] to get every failing field at once.
//!
//! ```ignore
//! let message = Message::event(&config, "create_user", json!({ "mail": "x@y.z" }));
//! message.validate()?;
//! let wire = message.to_json()?; // {"uuid":..., "type":"event_create_user", ...}
//! let rebuilt = builder::build_str(&wire)?;
//! ```

pub mod builder;
mod error;
mod message;
mod timestamp;
mod validator;

pub use builder::{build, build_str};
pub use error::{FieldError, FieldErrors, MessageError, MessageResult};
pub use message::{ClientError, EntityRef, Envelope, Message, MessageV1, MessageV2, Publisher};
pub use timestamp::Timestamp;
