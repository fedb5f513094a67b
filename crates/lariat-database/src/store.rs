//! Storage driver traits.

use crate::{
    ClientErrorRecord, DatabaseResult, InboxRecord, MemoryStore, NewInboxRecord, NewOutboxRecord,
    OutboxRecord, SqliteStore,
};
use chrono::{DateTime, Utc};
use lariat_core::{StorageConfig, StorageDriver};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Outbox table operations.
pub trait OutboxStore: Send + Sync {
    /// Insert a row. Fails with `DuplicateKey` if the uuid exists.
    fn insert_outbox(&self, record: &NewOutboxRecord) -> DatabaseResult<Uuid>;

    /// Insert several rows atomically: all or none.
    fn insert_outbox_batch(&self, records: &[NewOutboxRecord]) -> DatabaseResult<()>;

    fn get_outbox(&self, uuid: Uuid) -> DatabaseResult<Option<OutboxRecord>>;

    /// Delete rows by uuid. Unknown uuids are ignored.
    fn delete_outbox(&self, uuids: &[Uuid]) -> DatabaseResult<()>;

    /// Record the last sending error. Returns whether a row was updated.
    fn update_outbox_error(&self, uuid: Uuid, error: &str) -> DatabaseResult<bool>;

    /// Rows created at or before `cutoff`, oldest first.
    fn list_outbox_for_resend(&self, cutoff: DateTime<Utc>) -> DatabaseResult<Vec<OutboxRecord>>;

    fn count_outbox(&self) -> DatabaseResult<usize>;
}

/// Inbox table operations.
pub trait InboxStore: Send + Sync {
    /// Insert a row. Fails with `DuplicateKey` if the uuid exists.
    fn insert_inbox(&self, record: &NewInboxRecord) -> DatabaseResult<()>;

    fn inbox_exists(&self, uuid: Uuid) -> DatabaseResult<bool>;

    fn get_inbox(&self, uuid: Uuid) -> DatabaseResult<Option<InboxRecord>>;

    /// Set `processed_at` and the optional client error. Only the first call
    /// for a row has an effect; returns whether it did.
    fn mark_inbox_processed(
        &self,
        uuid: Uuid,
        client_error: Option<&ClientErrorRecord>,
    ) -> DatabaseResult<bool>;

    /// Rows not yet processed, oldest first.
    fn list_inbox_unprocessed(&self) -> DatabaseResult<Vec<InboxRecord>>;

    /// Processed rows that carry a client error, oldest first.
    fn list_inbox_with_client_error(&self) -> DatabaseResult<Vec<InboxRecord>>;

    fn delete_inbox(&self, uuids: &[Uuid]) -> DatabaseResult<()>;
}

/// A driver implementing both tables.
pub trait Store: OutboxStore + InboxStore {}

impl<T: OutboxStore + InboxStore> Store for T {}

/// Resolve the configured driver.
///
/// A SQLite config without a path opens an in-memory database.
pub fn open_store(config: &StorageConfig) -> DatabaseResult<Arc<dyn Store>> {
    info!(driver = config.driver.as_str(), path = ?config.path, "Opening store");
    let store: Arc<dyn Store> = match (&config.driver, &config.path) {
        (StorageDriver::Sqlite, Some(path)) => Arc::new(SqliteStore::open(path)?),
        (StorageDriver::Sqlite, None) => Arc::new(SqliteStore::open_in_memory()?),
        (StorageDriver::Memory, _) => Arc::new(MemoryStore::new()),
    };
    Ok(store)
}
