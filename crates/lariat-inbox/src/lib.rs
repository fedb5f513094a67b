//! Inbox deduplication for consumers.
//!
//! [`InboxMiddleware`] records each received message in the inbox table
//! before handing it to a [`MessageHandler`], and skips messages already
//! marked processed. Redelivered messages therefore reach business logic
//! once, unless the handler fails fatally.

mod error;
mod handler;
mod middleware;
mod repository;

pub use error::{InboxError, InboxResult};
pub use handler::{HandlerError, MessageHandler};
pub use middleware::{InboxMiddleware, InboxNotice, Notifier, Outcome};
pub use repository::InboxRepository;
