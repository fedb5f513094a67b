//! Outbox and inbox storage for the lariat workspace.
//!
//! This crate provides:
//! - Driver traits for the outbox and inbox tables ([`OutboxStore`], [`InboxStore`])
//! - A SQLite driver with WAL mode and embedded migrations ([`SqliteStore`])
//! - An in-process driver with the same behaviour ([`MemoryStore`])
//! - Row types shared by both drivers
//!
//! Rows hold message fields as strings; rebuilding typed messages is the job
//! of the outbox and inbox repositories.
//!
//! ```ignore
//! let store = open_store(&StorageConfig::sqlite("/var/lib/app/lariat.db"))?;
//! store.insert_outbox(&record)?;
//! let due = store.list_outbox_for_resend(Utc::now() - chrono::Duration::minutes(2))?;
//! ```

mod error;
mod memory;
mod migrations;
mod models;
mod sqlite;
mod store;

pub use error::{DatabaseError, DatabaseResult};
pub use memory::MemoryStore;
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use models::{ClientErrorRecord, InboxRecord, NewInboxRecord, NewOutboxRecord, OutboxRecord};
pub use sqlite::SqliteStore;
pub use store::{open_store, InboxStore, OutboxStore, Store};

pub use rusqlite;
