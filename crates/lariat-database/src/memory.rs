//! In-process driver.
//!
//! Behaves like [`crate::SqliteStore`] without persistence. Useful for tests and
//! for services that only need at-least-once delivery within one process.

use crate::models::{now, truncate};
use crate::{
    ClientErrorRecord, DatabaseError, DatabaseResult, InboxRecord, InboxStore, NewInboxRecord,
    NewOutboxRecord, OutboxRecord, OutboxStore,
};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    /// Insertion order doubles as the tiebreak for equal timestamps.
    outbox: Vec<OutboxRecord>,
    inbox: Vec<InboxRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> DatabaseResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| DatabaseError::Connection("memory store mutex poisoned".to_string()))
    }
}

impl OutboxStore for MemoryStore {
    fn insert_outbox(&self, record: &NewOutboxRecord) -> DatabaseResult<Uuid> {
        let mut tables = self.tables()?;
        if tables.outbox.iter().any(|r| r.uuid == record.uuid) {
            return Err(DatabaseError::DuplicateKey(record.uuid.to_string()));
        }
        tables.outbox.push(OutboxRecord::from_new(record, now()));
        Ok(record.uuid)
    }

    fn insert_outbox_batch(&self, records: &[NewOutboxRecord]) -> DatabaseResult<()> {
        let mut tables = self.tables()?;
        for (i, record) in records.iter().enumerate() {
            let clash = tables.outbox.iter().any(|r| r.uuid == record.uuid)
                || records[..i].iter().any(|r| r.uuid == record.uuid);
            if clash {
                return Err(DatabaseError::DuplicateKey(record.uuid.to_string()));
            }
        }
        for record in records {
            tables.outbox.push(OutboxRecord::from_new(record, now()));
        }
        Ok(())
    }

    fn get_outbox(&self, uuid: Uuid) -> DatabaseResult<Option<OutboxRecord>> {
        let tables = self.tables()?;
        Ok(tables.outbox.iter().find(|r| r.uuid == uuid).cloned())
    }

    fn delete_outbox(&self, uuids: &[Uuid]) -> DatabaseResult<()> {
        let mut tables = self.tables()?;
        tables.outbox.retain(|r| !uuids.contains(&r.uuid));
        Ok(())
    }

    fn update_outbox_error(&self, uuid: Uuid, error: &str) -> DatabaseResult<bool> {
        let mut tables = self.tables()?;
        match tables.outbox.iter_mut().find(|r| r.uuid == uuid) {
            Some(record) => {
                record.sending_error = Some(error.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list_outbox_for_resend(&self, cutoff: DateTime<Utc>) -> DatabaseResult<Vec<OutboxRecord>> {
        let cutoff = truncate(cutoff);
        let tables = self.tables()?;
        let mut rows: Vec<OutboxRecord> = tables
            .outbox
            .iter()
            .filter(|r| r.created_at <= cutoff)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.created_at);
        Ok(rows)
    }

    fn count_outbox(&self) -> DatabaseResult<usize> {
        Ok(self.tables()?.outbox.len())
    }
}

impl InboxStore for MemoryStore {
    fn insert_inbox(&self, record: &NewInboxRecord) -> DatabaseResult<()> {
        let mut tables = self.tables()?;
        if tables.inbox.iter().any(|r| r.uuid == record.uuid) {
            return Err(DatabaseError::DuplicateKey(record.uuid.to_string()));
        }
        tables.inbox.push(InboxRecord::from_new(record));
        Ok(())
    }

    fn inbox_exists(&self, uuid: Uuid) -> DatabaseResult<bool> {
        Ok(self.tables()?.inbox.iter().any(|r| r.uuid == uuid))
    }

    fn get_inbox(&self, uuid: Uuid) -> DatabaseResult<Option<InboxRecord>> {
        let tables = self.tables()?;
        Ok(tables.inbox.iter().find(|r| r.uuid == uuid).cloned())
    }

    fn mark_inbox_processed(
        &self,
        uuid: Uuid,
        client_error: Option<&ClientErrorRecord>,
    ) -> DatabaseResult<bool> {
        let mut tables = self.tables()?;
        let Some(record) = tables
            .inbox
            .iter_mut()
            .find(|r| r.uuid == uuid && r.processed_at.is_none())
        else {
            return Ok(false);
        };
        record.processed_at = Some(now());
        record.client_error_message = client_error.map(|e| e.message.clone());
        record.client_error_details = client_error.and_then(|e| e.details.clone());
        Ok(true)
    }

    fn list_inbox_unprocessed(&self) -> DatabaseResult<Vec<InboxRecord>> {
        self.list_inbox_where(|r| r.processed_at.is_none())
    }

    fn list_inbox_with_client_error(&self) -> DatabaseResult<Vec<InboxRecord>> {
        self.list_inbox_where(|r| r.client_error_message.is_some())
    }

    fn delete_inbox(&self, uuids: &[Uuid]) -> DatabaseResult<()> {
        let mut tables = self.tables()?;
        tables.inbox.retain(|r| !uuids.contains(&r.uuid));
        Ok(())
    }
}

impl MemoryStore {
    fn list_inbox_where(
        &self,
        predicate: impl Fn(&InboxRecord) -> bool,
    ) -> DatabaseResult<Vec<InboxRecord>> {
        let tables = self.tables()?;
        let mut rows: Vec<InboxRecord> =
            tables.inbox.iter().filter(|r| predicate(r)).cloned().collect();
        rows.sort_by_key(|r| r.received_at);
        Ok(rows)
    }
}
