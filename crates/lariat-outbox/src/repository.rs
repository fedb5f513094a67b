//! Message-aware access to the outbox table.

use crate::{OutboxError, OutboxResult};
use chrono::{DateTime, Utc};
use lariat_core::Config;
use lariat_core::StorageDriver;
use lariat_database::{open_store, NewOutboxRecord, OutboxRecord, SqliteStore, Store};
use lariat_messages::{build_str, Message, MessageResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Outbox repository. Without a store it is disabled: writes succeed without
/// effect and reads come back empty.
#[derive(Clone)]
pub struct OutboxRepository {
    store: Option<Arc<dyn Store>>,
    sqlite: Option<Arc<SqliteStore>>,
}

impl OutboxRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store: Some(store),
            sqlite: None,
        }
    }

    /// Repository over a SQLite store. Only these support
    /// [`crate::OutboxService::sqlite_transaction`].
    pub fn sqlite(store: Arc<SqliteStore>) -> Self {
        Self {
            store: Some(store.clone()),
            sqlite: Some(store),
        }
    }

    pub fn disabled() -> Self {
        Self {
            store: None,
            sqlite: None,
        }
    }

    /// Open the configured store, or a disabled repository when none is configured.
    pub fn from_config(config: &Config) -> OutboxResult<Self> {
        let Some(storage) = &config.storage else {
            return Ok(Self::disabled());
        };
        match (&storage.driver, &storage.path) {
            (StorageDriver::Sqlite, Some(path)) => Ok(Self::sqlite(Arc::new(SqliteStore::open(path)?))),
            (StorageDriver::Sqlite, None) => Ok(Self::sqlite(Arc::new(SqliteStore::open_in_memory()?))),
            (StorageDriver::Memory, _) => Ok(Self::new(open_store(storage)?)),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.store.is_none()
    }

    /// The SQLite store rows live in, when the repository has one.
    pub fn sqlite_store(&self) -> Option<&Arc<SqliteStore>> {
        self.sqlite.as_ref()
    }

    /// Validate and store a message. Returns its uuid, or `None` when disabled.
    pub fn create(&self, message: &Message) -> OutboxResult<Option<Uuid>> {
        let record = Self::record_for(message)?;
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let uuid = store.insert_outbox(&record)?;
        debug!(uuid = %uuid, message_type = message.message_type(), "Stored outbox message");
        Ok(Some(uuid))
    }

    /// Validate and store messages atomically.
    pub fn create_all(&self, messages: &[Message]) -> OutboxResult<()> {
        let records = messages
            .iter()
            .map(Self::record_for)
            .collect::<OutboxResult<Vec<_>>>()?;
        if let Some(store) = &self.store {
            store.insert_outbox_batch(&records)?;
        }
        Ok(())
    }

    pub fn find(&self, uuid: Uuid) -> OutboxResult<Option<Message>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        match store.get_outbox(uuid)? {
            Some(record) => Ok(Some(build_str(&record.serialized_message)?)),
            None => Ok(None),
        }
    }

    pub fn delete(&self, uuids: &[Uuid]) -> OutboxResult<()> {
        if let Some(store) = &self.store {
            store.delete_outbox(uuids)?;
        }
        Ok(())
    }

    pub fn update_error(&self, uuid: Uuid, error: &str) -> OutboxResult<()> {
        if let Some(store) = &self.store {
            store.update_outbox_error(uuid, error)?;
        }
        Ok(())
    }

    /// Rows at least `older_than` old, oldest first, each rebuilt into a message.
    ///
    /// A row that cannot be rebuilt is returned with its error so the caller
    /// can record it without losing the rest of the batch.
    pub fn each_for_resend(
        &self,
        older_than: Duration,
    ) -> OutboxResult<Vec<(Uuid, MessageResult<Message>)>> {
        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };
        let cutoff = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let rows = store.list_outbox_for_resend(cutoff)?;
        debug!(count = rows.len(), cutoff = %cutoff, "Loaded outbox rows for resend");
        Ok(rows
            .into_iter()
            .map(|record: OutboxRecord| (record.uuid, build_str(&record.serialized_message)))
            .collect())
    }

    pub fn count(&self) -> OutboxResult<usize> {
        match &self.store {
            Some(store) => Ok(store.count_outbox()?),
            None => Ok(0),
        }
    }

    /// Storage row for a message. Fails if the message is invalid.
    pub fn record_for(message: &Message) -> OutboxResult<NewOutboxRecord> {
        message.validate()?;
        let uuid = message
            .id()
            .ok_or_else(|| OutboxError::InvalidId(message.uuid().to_string()))?;
        Ok(NewOutboxRecord {
            uuid,
            kind: message.kind().to_string(),
            message_type: message.message_type().to_string(),
            publisher: message.publisher_name().to_string(),
            serialized_message: message.to_json()?,
            group_id: message.group_id().map(str::to_string),
            deduplication_id: message.deduplication_id().map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lariat_core::StorageConfig;
    use lariat_database::{MemoryStore, OutboxStore, SqliteStore};
    use lariat_messages::MessageError;
    use serde_json::json;

    fn config() -> Config {
        Config::new("test", "sample_app")
    }

    fn repositories() -> Vec<(&'static str, OutboxRepository)> {
        vec![
            ("sqlite", OutboxRepository::new(Arc::new(SqliteStore::open_in_memory().unwrap()))),
            ("memory", OutboxRepository::new(Arc::new(MemoryStore::new()))),
        ]
    }

    #[test]
    fn test_create_and_find() {
        for (driver, repo) in repositories() {
            let message = Message::event(&config(), "note_added", json!({ "id": 7 }))
                .with_group_id("notes");
            let uuid = repo.create(&message).unwrap().unwrap();
            assert_eq!(uuid.to_string(), message.uuid(), "{driver}");
            assert_eq!(repo.find(uuid).unwrap(), Some(message), "{driver}");
            assert_eq!(repo.count().unwrap(), 1, "{driver}");
        }
    }

    #[test]
    fn test_create_rejects_invalid_message() {
        let repo = OutboxRepository::new(Arc::new(MemoryStore::new()));
        let v2 = Config::new("test", "sample_app").with_version(2);
        let err = repo
            .create(&Message::event(&v2, "incomplete", json!({})))
            .unwrap_err();
        assert!(matches!(err, OutboxError::Message(MessageError::InvalidMessage { .. })));
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_disabled_repository_is_neutral() {
        let repo = OutboxRepository::disabled();
        assert!(repo.is_disabled());
        let message = Message::event(&config(), "a", json!({}));
        assert_eq!(repo.create(&message).unwrap(), None);
        repo.create_all(&[message.clone()]).unwrap();
        repo.delete(&[Uuid::new_v4()]).unwrap();
        repo.update_error(Uuid::new_v4(), "x").unwrap();
        assert!(repo.each_for_resend(Duration::ZERO).unwrap().is_empty());
        assert_eq!(repo.find(Uuid::new_v4()).unwrap(), None);
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_from_config() {
        assert!(OutboxRepository::from_config(&config()).unwrap().is_disabled());
        let enabled = config().with_storage(StorageConfig::memory());
        let repo = OutboxRepository::from_config(&enabled).unwrap();
        assert!(!repo.is_disabled());
        assert!(repo.sqlite_store().is_none());
    }

    #[test]
    fn test_from_config_keeps_sqlite_handle() {
        let dir = tempfile::tempdir().unwrap();
        let in_memory = StorageConfig {
            driver: StorageDriver::Sqlite,
            path: None,
        };
        for storage in [StorageConfig::sqlite(dir.path().join("lariat.db")), in_memory] {
            let repo = OutboxRepository::from_config(&config().with_storage(storage)).unwrap();
            let message = Message::event(&config(), "a", json!({}));
            repo.create(&message).unwrap();

            let store = repo.sqlite_store().unwrap();
            assert!(store.get_outbox(message.id().unwrap()).unwrap().is_some());
        }
    }

    #[test]
    fn test_each_for_resend_respects_age() {
        for (driver, repo) in repositories() {
            let message = Message::command(&config(), "sync", json!({}));
            repo.create(&message).unwrap();

            assert!(repo.each_for_resend(Duration::from_secs(3600)).unwrap().is_empty(), "{driver}");
            let due = repo.each_for_resend(Duration::ZERO).unwrap();
            assert_eq!(due.len(), 1, "{driver}");
            assert_eq!(due[0].1.as_ref().unwrap(), &message, "{driver}");
        }
    }

    #[test]
    fn test_each_for_resend_surfaces_corrupt_rows() {
        let store = Arc::new(MemoryStore::new());
        let repo = OutboxRepository::new(store.clone());
        let mut record = OutboxRepository::record_for(&Message::event(&config(), "a", json!({}))).unwrap();
        record.serialized_message = r#"{"type":"query_a","version":1}"#.to_string();
        store.insert_outbox(&record).unwrap();

        let due = repo.each_for_resend(Duration::ZERO).unwrap();
        assert_eq!(due.len(), 1);
        assert!(matches!(due[0].1, Err(MessageError::UnknownMessageKind(_))));
    }

    #[test]
    fn test_delete_and_update_error() {
        for (driver, repo) in repositories() {
            let a = Message::event(&config(), "a", json!({}));
            let b = Message::event(&config(), "b", json!({}));
            repo.create_all(&[a.clone(), b.clone()]).unwrap();

            let a_id = a.id().unwrap();
            repo.update_error(a_id, "broker down").unwrap();
            repo.delete(&[b.id().unwrap()]).unwrap();
            assert_eq!(repo.count().unwrap(), 1, "{driver}");
            assert!(repo.find(a_id).unwrap().is_some(), "{driver}");
        }
    }
}
