//! Transactional outbox.
//!
//! Messages are buffered in an [`Outbox`] during a unit of work, stored in the
//! same commit, and published afterwards by [`OutboxService`]. Messages the
//! broker refuses stay in storage with their error and are retried by
//! [`OutboxService::resend`], either on demand or from a [`ResendWorker`].
//!
//! ```ignore
//! let repository = OutboxRepository::sqlite(store);
//! let service = OutboxService::new(config, repository, broker);
//! let (_, report) = service
//!     .sqlite_transaction(|tx, outbox| {
//!         tx.execute("INSERT INTO notes (id) VALUES (?1)", [&id])?;
//!         outbox.push(Message::event(service.config(), "note_added", json!({ "id": id })));
//!         Ok::<_, AppError>(())
//!     })
//!     .await?;
//! ```

mod error;
mod outbox;
mod repository;
mod service;
mod worker;

pub use error::{OutboxError, OutboxResult};
pub use outbox::Outbox;
pub use repository::OutboxRepository;
pub use service::{OutboxService, PublishReport, SendingErrorCallback};
pub use worker::{ResendHandle, ResendWorker};
