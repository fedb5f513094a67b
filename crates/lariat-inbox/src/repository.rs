//! Message-aware access to the inbox table.

use crate::{InboxError, InboxResult};
use chrono::Utc;
use lariat_core::Config;
use lariat_database::{open_store, ClientErrorRecord, InboxRecord, NewInboxRecord, Store};
use lariat_messages::{build, ClientError, Message, MessageResult, Timestamp};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Inbox repository. Without a store it is disabled: nothing is recorded
/// and every lookup misses.
#[derive(Clone)]
pub struct InboxRepository {
    store: Option<Arc<dyn Store>>,
}

impl InboxRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store: Some(store) }
    }

    pub fn disabled() -> Self {
        Self { store: None }
    }

    pub fn from_config(config: &Config) -> InboxResult<Self> {
        match &config.storage {
            Some(storage) => Ok(Self::new(open_store(storage)?)),
            None => Ok(Self::disabled()),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.store.is_none()
    }

    /// Record a received message. `received_at` defaults to now.
    ///
    /// Fails with a duplicate-key database error if the uuid is already stored.
    pub fn create(&self, message: &Message) -> InboxResult<Option<Uuid>> {
        let record = Self::record_for(message)?;
        let Some(store) = &self.store else {
            return Ok(None);
        };
        store.insert_inbox(&record)?;
        debug!(uuid = %record.uuid, message_type = message.message_type(), "Stored inbox message");
        Ok(Some(record.uuid))
    }

    pub fn exists(&self, uuid: Uuid) -> InboxResult<bool> {
        match &self.store {
            Some(store) => Ok(store.inbox_exists(uuid)?),
            None => Ok(false),
        }
    }

    /// Stored message with its processing state.
    pub fn find(&self, uuid: Uuid) -> InboxResult<Option<Message>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        match store.get_inbox(uuid)? {
            Some(record) => Ok(Some(message_from_record(&record)?)),
            None => Ok(None),
        }
    }

    /// Mark a message handled, optionally with the client error it produced.
    /// Returns false if it was already processed or is not stored.
    pub fn mark_processed(&self, uuid: Uuid, client_error: Option<&ClientError>) -> InboxResult<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        let record = client_error.map(client_error_record).transpose()?;
        Ok(store.mark_inbox_processed(uuid, record.as_ref())?)
    }

    /// Messages received but not yet processed, oldest first.
    pub fn each_unprocessed(&self) -> InboxResult<Vec<(Uuid, MessageResult<Message>)>> {
        match &self.store {
            Some(store) => Ok(rebuild_all(store.list_inbox_unprocessed()?)),
            None => Ok(Vec::new()),
        }
    }

    /// Messages whose handler reported a client error, oldest first.
    pub fn each_with_client_error(&self) -> InboxResult<Vec<(Uuid, MessageResult<Message>)>> {
        match &self.store {
            Some(store) => Ok(rebuild_all(store.list_inbox_with_client_error()?)),
            None => Ok(Vec::new()),
        }
    }

    pub fn delete(&self, uuids: &[Uuid]) -> InboxResult<()> {
        if let Some(store) = &self.store {
            store.delete_inbox(uuids)?;
        }
        Ok(())
    }

    /// Storage row for a message. Fails if the message is invalid.
    pub fn record_for(message: &Message) -> InboxResult<NewInboxRecord> {
        message.validate()?;
        let uuid = message
            .id()
            .ok_or_else(|| InboxError::InvalidId(message.uuid().to_string()))?;
        let fields = message.serialize();
        let received_at = message
            .received_at()
            .and_then(Timestamp::as_datetime)
            .unwrap_or_else(Utc::now);

        Ok(NewInboxRecord {
            uuid,
            kind: message.kind().to_string(),
            message_type: message.message_type().to_string(),
            publisher: match fields.get("publisher") {
                Some(Value::String(name)) => name.clone(),
                Some(entity) => entity.to_string(),
                None => String::new(),
            },
            data: serde_json::to_string(message.data())?,
            version: message.version(),
            sent_at: message.sent_at().render(),
            request_id: message.request_id().map(str::to_string),
            subject: fields.get("subject").map(Value::to_string),
            object: fields.get("object").map(Value::to_string),
            received_at,
        })
    }
}

fn client_error_record(error: &ClientError) -> InboxResult<ClientErrorRecord> {
    let details = match &error.details {
        Value::Null => None,
        details => Some(serde_json::to_string(details)?),
    };
    Ok(ClientErrorRecord {
        message: error.message.clone(),
        details,
    })
}

fn rebuild_all(records: Vec<InboxRecord>) -> Vec<(Uuid, MessageResult<Message>)> {
    records
        .iter()
        .map(|record| (record.uuid, message_from_record(record)))
        .collect()
}

/// Column values that hold JSON. Falls back to the raw string when the
/// column holds a plain name.
fn json_column(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        _ => Value::String(raw.to_string()),
    }
}

fn message_from_record(record: &InboxRecord) -> MessageResult<Message> {
    let mut fields = Map::new();
    fields.insert("kind".into(), Value::String(record.kind.clone()));
    fields.insert("uuid".into(), Value::String(record.uuid.to_string()));
    fields.insert("publisher".into(), json_column(&record.publisher));
    fields.insert("type".into(), Value::String(record.message_type.clone()));
    fields.insert("version".into(), Value::from(record.version));
    fields.insert("data".into(), serde_json::from_str(&record.data)?);
    fields.insert("sent_at".into(), Value::String(record.sent_at.clone()));
    if let Some(request_id) = &record.request_id {
        fields.insert("request_id".into(), Value::String(request_id.clone()));
    }
    if let Some(subject) = &record.subject {
        fields.insert("subject".into(), serde_json::from_str(subject)?);
    }
    if let Some(object) = &record.object {
        fields.insert("object".into(), serde_json::from_str(object)?);
    }
    fields.insert(
        "received_at".into(),
        Value::String(Timestamp::from(record.received_at).render()),
    );
    if let Some(processed_at) = record.processed_at {
        fields.insert(
            "processed_at".into(),
            Value::String(Timestamp::from(processed_at).render()),
        );
    }
    if let Some(message) = &record.client_error_message {
        let details = match &record.client_error_details {
            Some(details) => serde_json::from_str(details)?,
            None => Value::Null,
        };
        fields.insert(
            "client_error".into(),
            serde_json::json!({ "message": message, "details": details }),
        );
    }
    build(&Value::Object(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lariat_core::{MessageKind, StorageConfig};
    use lariat_database::{DatabaseError, MemoryStore, SqliteStore};
    use lariat_messages::{EntityRef, MessageV2};
    use serde_json::json;

    fn config() -> Config {
        Config::new("test", "sample_app")
    }

    fn repositories() -> Vec<(&'static str, InboxRepository)> {
        vec![
            ("sqlite", InboxRepository::new(Arc::new(SqliteStore::open_in_memory().unwrap()))),
            ("memory", InboxRepository::new(Arc::new(MemoryStore::new()))),
        ]
    }

    fn v2_message() -> Message {
        MessageV2::new(
            MessageKind::Event,
            EntityRef::new("service", Uuid::new_v4().to_string()),
            "note_added",
            json!({ "text": "hello" }),
            EntityRef::new("user", Uuid::new_v4().to_string()),
            EntityRef::new("note", Uuid::new_v4().to_string()),
        )
        .into()
    }

    #[test]
    fn test_create_and_find_v1() {
        for (driver, repo) in repositories() {
            let message = Message::event(&config(), "note_added", json!({ "id": 7 }))
                .with_request_id(Uuid::new_v4());
            let uuid = repo.create(&message).unwrap().unwrap();

            let found = repo.find(uuid).unwrap().unwrap();
            assert_eq!(found.uuid(), message.uuid(), "{driver}");
            assert_eq!(found.publisher_name(), "sample_app", "{driver}");
            assert_eq!(found.data(), message.data(), "{driver}");
            assert_eq!(found.request_id(), message.request_id(), "{driver}");
            assert_eq!(found.sent_at(), message.sent_at(), "{driver}");
            assert!(found.received_at().is_some(), "{driver}");
            assert!(!found.is_processed(), "{driver}");
            found.validate().unwrap();
        }
    }

    #[test]
    fn test_create_and_find_v2_with_entities() {
        for (driver, repo) in repositories() {
            let message = v2_message();
            let uuid = repo.create(&message).unwrap().unwrap();

            let found = repo.find(uuid).unwrap().unwrap();
            assert_eq!(found.version(), 2, "{driver}");
            assert_eq!(found.publisher_name(), "service", "{driver}");
            assert_eq!(found.serialize().get("subject"), message.serialize().get("subject"));
            assert_eq!(found.serialize().get("object"), message.serialize().get("object"));
            found.validate().unwrap();
        }
    }

    #[test]
    fn test_create_rejects_duplicates() {
        for (driver, repo) in repositories() {
            let message = Message::command(&config(), "charge", json!({}));
            repo.create(&message).unwrap();
            let err = repo.create(&message).unwrap_err();
            assert!(
                matches!(err, InboxError::Database(DatabaseError::DuplicateKey(_))),
                "{driver}: {err}"
            );
        }
    }

    #[test]
    fn test_create_rejects_invalid_message() {
        for (_, repo) in repositories() {
            let mut message = Message::event(&config(), "note_added", json!({}));
            message.envelope_mut().uuid = "nope".into();
            assert!(matches!(repo.create(&message), Err(InboxError::Message(_))));
        }
    }

    #[test]
    fn test_mark_processed_once_with_client_error() {
        for (driver, repo) in repositories() {
            let message = Message::event(&config(), "note_added", json!({}));
            let uuid = repo.create(&message).unwrap().unwrap();
            assert_eq!(repo.each_unprocessed().unwrap().len(), 1, "{driver}");

            let error = ClientError::new("note is locked").with_details(json!({ "note": 1 }));
            assert!(repo.mark_processed(uuid, Some(&error)).unwrap(), "{driver}");
            assert!(!repo.mark_processed(uuid, None).unwrap(), "{driver}");

            let found = repo.find(uuid).unwrap().unwrap();
            assert!(found.is_processed(), "{driver}");
            assert_eq!(found.client_error(), Some(&error), "{driver}");
            assert!(repo.each_unprocessed().unwrap().is_empty(), "{driver}");

            let failed = repo.each_with_client_error().unwrap();
            assert_eq!(failed.len(), 1, "{driver}");
            assert_eq!(failed[0].0, uuid, "{driver}");
        }
    }

    #[test]
    fn test_mark_processed_unknown_uuid() {
        for (_, repo) in repositories() {
            assert!(!repo.mark_processed(Uuid::new_v4(), None).unwrap());
        }
    }

    #[test]
    fn test_delete() {
        for (_, repo) in repositories() {
            let message = Message::event(&config(), "note_added", json!({}));
            let uuid = repo.create(&message).unwrap().unwrap();
            assert!(repo.exists(uuid).unwrap());
            repo.delete(&[uuid]).unwrap();
            assert!(!repo.exists(uuid).unwrap());
        }
    }

    #[test]
    fn test_disabled_repository() {
        let repo = InboxRepository::disabled();
        let message = Message::event(&config(), "note_added", json!({}));
        assert!(repo.is_disabled());
        assert_eq!(repo.create(&message).unwrap(), None);
        let uuid = message.id().unwrap();
        assert!(!repo.exists(uuid).unwrap());
        assert!(repo.find(uuid).unwrap().is_none());
        assert!(!repo.mark_processed(uuid, None).unwrap());
        assert!(repo.each_unprocessed().unwrap().is_empty());
    }

    #[test]
    fn test_from_config() {
        assert!(InboxRepository::from_config(&config()).unwrap().is_disabled());
        let config = config().with_storage(StorageConfig::memory());
        assert!(!InboxRepository::from_config(&config).unwrap().is_disabled());
    }
}
