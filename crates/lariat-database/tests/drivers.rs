//! Both drivers must behave the same; every test runs against each.

use chrono::Utc;
use lariat_core::StorageConfig;
use lariat_database::{
    open_store, ClientErrorRecord, DatabaseError, InboxStore, MemoryStore, NewInboxRecord,
    NewOutboxRecord, OutboxStore, SqliteStore, Store,
};
use std::thread::sleep;
use std::time::Duration;
use uuid::Uuid;

fn drivers() -> Vec<(&'static str, Box<dyn Store>)> {
    vec![
        ("sqlite", Box::new(SqliteStore::open_in_memory().unwrap()) as Box<dyn Store>),
        ("memory", Box::new(MemoryStore::new()) as Box<dyn Store>),
    ]
}

fn outbox_record(message_type: &str) -> NewOutboxRecord {
    let uuid = Uuid::new_v4();
    NewOutboxRecord {
        uuid,
        kind: "event".to_string(),
        message_type: message_type.to_string(),
        publisher: "sample_app".to_string(),
        serialized_message: format!(r#"{{"uuid":"{uuid}","type":"event_{message_type}"}}"#),
        group_id: Some("group".to_string()),
        deduplication_id: None,
    }
}

fn inbox_record() -> NewInboxRecord {
    NewInboxRecord {
        uuid: Uuid::new_v4(),
        kind: "command".to_string(),
        message_type: "sync".to_string(),
        publisher: "billing".to_string(),
        data: r#"{"a":1}"#.to_string(),
        version: 1,
        sent_at: "2024-01-01T00:00:00.000+00:00".to_string(),
        request_id: None,
        subject: None,
        object: None,
        received_at: Utc::now(),
    }
}

#[test]
fn test_outbox_insert_and_get() {
    for (driver, store) in drivers() {
        let record = outbox_record("note_added");
        let uuid = store.insert_outbox(&record).unwrap();
        assert_eq!(uuid, record.uuid, "{driver}");

        let stored = store.get_outbox(uuid).unwrap().unwrap();
        assert_eq!(stored.message_type, "note_added", "{driver}");
        assert_eq!(stored.serialized_message, record.serialized_message, "{driver}");
        assert_eq!(stored.group_id.as_deref(), Some("group"), "{driver}");
        assert_eq!(stored.sending_error, None, "{driver}");
        assert!(store.get_outbox(Uuid::new_v4()).unwrap().is_none(), "{driver}");
    }
}

#[test]
fn test_outbox_duplicate_key() {
    for (driver, store) in drivers() {
        let record = outbox_record("a");
        store.insert_outbox(&record).unwrap();
        let err = store.insert_outbox(&record).unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateKey(_)), "{driver}: {err}");
        assert_eq!(store.count_outbox().unwrap(), 1, "{driver}");
    }
}

#[test]
fn test_outbox_batch_is_atomic() {
    for (driver, store) in drivers() {
        let existing = outbox_record("a");
        store.insert_outbox(&existing).unwrap();

        let batch = vec![outbox_record("b"), existing.clone()];
        assert!(store.insert_outbox_batch(&batch).is_err(), "{driver}");
        assert_eq!(store.count_outbox().unwrap(), 1, "{driver}");

        store
            .insert_outbox_batch(&[outbox_record("c"), outbox_record("d")])
            .unwrap();
        assert_eq!(store.count_outbox().unwrap(), 3, "{driver}");
    }
}

#[test]
fn test_outbox_delete_ignores_unknown() {
    for (driver, store) in drivers() {
        let a = outbox_record("a");
        let b = outbox_record("b");
        store.insert_outbox(&a).unwrap();
        store.insert_outbox(&b).unwrap();

        store.delete_outbox(&[a.uuid, Uuid::new_v4()]).unwrap();
        store.delete_outbox(&[]).unwrap();
        assert!(store.get_outbox(a.uuid).unwrap().is_none(), "{driver}");
        assert!(store.get_outbox(b.uuid).unwrap().is_some(), "{driver}");
    }
}

#[test]
fn test_outbox_update_error() {
    for (driver, store) in drivers() {
        let record = outbox_record("a");
        store.insert_outbox(&record).unwrap();

        assert!(store.update_outbox_error(record.uuid, "broker down").unwrap(), "{driver}");
        assert!(!store.update_outbox_error(Uuid::new_v4(), "x").unwrap(), "{driver}");
        let stored = store.get_outbox(record.uuid).unwrap().unwrap();
        assert_eq!(stored.sending_error.as_deref(), Some("broker down"), "{driver}");
    }
}

#[test]
fn test_outbox_resend_cutoff_and_order() {
    for (driver, store) in drivers() {
        let first = outbox_record("first");
        let second = outbox_record("second");
        store.insert_outbox(&first).unwrap();
        sleep(Duration::from_millis(5));
        store.insert_outbox(&second).unwrap();
        sleep(Duration::from_millis(5));
        let cutoff = Utc::now();
        sleep(Duration::from_millis(5));
        store.insert_outbox(&outbox_record("late")).unwrap();

        let due = store.list_outbox_for_resend(cutoff).unwrap();
        let types: Vec<&str> = due.iter().map(|r| r.message_type.as_str()).collect();
        assert_eq!(types, vec!["first", "second"], "{driver}");

        let first_at = due[0].created_at;
        let at_boundary = store.list_outbox_for_resend(first_at).unwrap();
        assert_eq!(at_boundary.len(), 1, "{driver}: cutoff is inclusive");
    }
}

#[test]
fn test_inbox_lifecycle() {
    for (driver, store) in drivers() {
        let record = inbox_record();
        assert!(!store.inbox_exists(record.uuid).unwrap(), "{driver}");
        store.insert_inbox(&record).unwrap();
        assert!(store.inbox_exists(record.uuid).unwrap(), "{driver}");

        let err = store.insert_inbox(&record).unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateKey(_)), "{driver}");

        let stored = store.get_inbox(record.uuid).unwrap().unwrap();
        assert!(!stored.is_processed(), "{driver}");
        assert_eq!(stored.data, r#"{"a":1}"#, "{driver}");
        assert_eq!(store.list_inbox_unprocessed().unwrap().len(), 1, "{driver}");

        assert!(store.mark_inbox_processed(record.uuid, None).unwrap(), "{driver}");
        assert!(!store.mark_inbox_processed(record.uuid, None).unwrap(), "{driver}");
        let stored = store.get_inbox(record.uuid).unwrap().unwrap();
        assert!(stored.is_processed(), "{driver}");
        assert!(store.list_inbox_unprocessed().unwrap().is_empty(), "{driver}");
    }
}

#[test]
fn test_inbox_client_error() {
    for (driver, store) in drivers() {
        let ok = inbox_record();
        let failed = inbox_record();
        store.insert_inbox(&ok).unwrap();
        store.insert_inbox(&failed).unwrap();

        store.mark_inbox_processed(ok.uuid, None).unwrap();
        let error = ClientErrorRecord {
            message: "card declined".to_string(),
            details: Some(r#"{"code":51}"#.to_string()),
        };
        store.mark_inbox_processed(failed.uuid, Some(&error)).unwrap();

        let with_errors = store.list_inbox_with_client_error().unwrap();
        assert_eq!(with_errors.len(), 1, "{driver}");
        assert_eq!(with_errors[0].uuid, failed.uuid, "{driver}");
        assert_eq!(with_errors[0].client_error_message.as_deref(), Some("card declined"));
        assert_eq!(with_errors[0].client_error_details.as_deref(), Some(r#"{"code":51}"#));
        assert!(with_errors[0].processed_at.is_some(), "{driver}");

        store.delete_inbox(&[failed.uuid]).unwrap();
        assert!(!store.inbox_exists(failed.uuid).unwrap(), "{driver}");
    }
}

#[test]
fn test_open_store_resolves_driver() {
    let dir = tempfile::tempdir().unwrap();
    for config in [
        StorageConfig::memory(),
        StorageConfig::sqlite(dir.path().join("lariat.db")),
    ] {
        let store = open_store(&config).unwrap();
        store.insert_outbox(&outbox_record("a")).unwrap();
        assert_eq!(store.count_outbox().unwrap(), 1, "{}", config.driver.as_str());
    }
}
