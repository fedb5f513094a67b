//! SQLite driver.

use crate::models::{format_datetime, now};
use crate::{
    migrations, ClientErrorRecord, DatabaseError, DatabaseResult, InboxRecord, InboxStore,
    NewInboxRecord, NewOutboxRecord, OutboxRecord, OutboxStore,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, Row, Transaction};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

const OUTBOX_COLUMNS: &str = "uuid, kind, type, publisher, serialized_message, group_id, \
                              deduplication_id, sending_error, created_at";

const INBOX_COLUMNS: &str = "uuid, kind, type, publisher, data, version, sent_at, request_id, \
                             subject, object, client_error_message, client_error_details, \
                             received_at, processed_at";

/// SQLite-backed store. The connection is shared behind a mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open a database at the given path, running migrations if needed.
    pub fn open(path: &Path) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;
        migrations::run_migrations(&conn)?;

        debug!(path = %path.display(), "Opened SQLite store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> DatabaseResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DatabaseError::Connection("connection mutex poisoned".to_string()))
    }

    /// Run `f` inside a transaction. Commits when `f` returns `Ok`, rolls back otherwise.
    ///
    /// The store is locked for the duration, so `f` must use the given
    /// transaction (see [`SqliteStore::insert_outbox_on`]) rather than calling
    /// back into the store.
    pub fn with_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<DatabaseError>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(DatabaseError::from)?;
        let value = f(&tx)?;
        tx.commit().map_err(DatabaseError::from)?;
        Ok(value)
    }

    /// Insert outbox rows through an open connection or transaction.
    pub fn insert_outbox_on(conn: &Connection, records: &[NewOutboxRecord]) -> DatabaseResult<()> {
        for record in records {
            insert_outbox_row(conn, record)?;
        }
        Ok(())
    }
}

impl OutboxStore for SqliteStore {
    fn insert_outbox(&self, record: &NewOutboxRecord) -> DatabaseResult<Uuid> {
        let conn = self.conn()?;
        insert_outbox_row(&conn, record)?;
        Ok(record.uuid)
    }

    fn insert_outbox_batch(&self, records: &[NewOutboxRecord]) -> DatabaseResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        Self::insert_outbox_on(&tx, records)?;
        tx.commit()?;
        Ok(())
    }

    fn get_outbox(&self, uuid: Uuid) -> DatabaseResult<Option<OutboxRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM lariat_outbox WHERE uuid = ?1"
        ))?;

        match stmt.query_row(params![uuid.to_string()], outbox_from_row) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_outbox(&self, uuids: &[Uuid]) -> DatabaseResult<()> {
        let conn = self.conn()?;
        delete_by_uuid(&conn, "lariat_outbox", uuids)
    }

    fn update_outbox_error(&self, uuid: Uuid, error: &str) -> DatabaseResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE lariat_outbox SET sending_error = ?1 WHERE uuid = ?2",
            params![error, uuid.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn list_outbox_for_resend(&self, cutoff: DateTime<Utc>) -> DatabaseResult<Vec<OutboxRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM lariat_outbox
             WHERE created_at <= ?1
             ORDER BY created_at ASC, rowid ASC"
        ))?;

        let rows = stmt
            .query_map(params![format_datetime(cutoff)], outbox_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn count_outbox(&self) -> DatabaseResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM lariat_outbox", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl InboxStore for SqliteStore {
    fn insert_inbox(&self, record: &NewInboxRecord) -> DatabaseResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO lariat_inbox (uuid, kind, type, publisher, data, version, sent_at,
                                       request_id, subject, object, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.uuid.to_string(),
                record.kind,
                record.message_type,
                record.publisher,
                record.data,
                record.version,
                record.sent_at,
                record.request_id,
                record.subject,
                record.object,
                format_datetime(record.received_at),
            ],
        )
        .map_err(|e| insert_error(e, record.uuid))?;
        Ok(())
    }

    fn inbox_exists(&self, uuid: Uuid) -> DatabaseResult<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM lariat_inbox WHERE uuid = ?1",
            params![uuid.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn get_inbox(&self, uuid: Uuid) -> DatabaseResult<Option<InboxRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {INBOX_COLUMNS} FROM lariat_inbox WHERE uuid = ?1"
        ))?;

        match stmt.query_row(params![uuid.to_string()], inbox_from_row) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn mark_inbox_processed(
        &self,
        uuid: Uuid,
        client_error: Option<&ClientErrorRecord>,
    ) -> DatabaseResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE lariat_inbox
             SET processed_at = ?1, client_error_message = ?2, client_error_details = ?3
             WHERE uuid = ?4 AND processed_at IS NULL",
            params![
                format_datetime(now()),
                client_error.map(|e| e.message.as_str()),
                client_error.and_then(|e| e.details.as_deref()),
                uuid.to_string(),
            ],
        )?;
        Ok(changed > 0)
    }

    fn list_inbox_unprocessed(&self) -> DatabaseResult<Vec<InboxRecord>> {
        self.list_inbox_where("processed_at IS NULL")
    }

    fn list_inbox_with_client_error(&self) -> DatabaseResult<Vec<InboxRecord>> {
        self.list_inbox_where("client_error_message IS NOT NULL")
    }

    fn delete_inbox(&self, uuids: &[Uuid]) -> DatabaseResult<()> {
        let conn = self.conn()?;
        delete_by_uuid(&conn, "lariat_inbox", uuids)
    }
}

impl SqliteStore {
    fn list_inbox_where(&self, condition: &str) -> DatabaseResult<Vec<InboxRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {INBOX_COLUMNS} FROM lariat_inbox
             WHERE {condition}
             ORDER BY received_at ASC, rowid ASC"
        ))?;

        let rows = stmt
            .query_map([], inbox_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn insert_outbox_row(conn: &Connection, record: &NewOutboxRecord) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO lariat_outbox (uuid, kind, type, publisher, serialized_message,
                                    group_id, deduplication_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.uuid.to_string(),
            record.kind,
            record.message_type,
            record.publisher,
            record.serialized_message,
            record.group_id,
            record.deduplication_id,
            format_datetime(now()),
        ],
    )
    .map_err(|e| insert_error(e, record.uuid))?;
    Ok(())
}

fn delete_by_uuid(conn: &Connection, table: &str, uuids: &[Uuid]) -> DatabaseResult<()> {
    if uuids.is_empty() {
        return Ok(());
    }
    let placeholders = std::iter::repeat("?")
        .take(uuids.len())
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("DELETE FROM {table} WHERE uuid IN ({placeholders})");

    let ids: Vec<String> = uuids.iter().map(Uuid::to_string).collect();
    let params_vec: Vec<&dyn rusqlite::ToSql> =
        ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();

    let deleted = conn.execute(&sql, params_vec.as_slice())?;
    debug!(table, requested = uuids.len(), deleted, "Deleted rows");
    Ok(())
}

fn insert_error(err: rusqlite::Error, uuid: Uuid) -> DatabaseError {
    match err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            DatabaseError::DuplicateKey(uuid.to_string())
        }
        other => other.into(),
    }
}

fn outbox_from_row(row: &Row<'_>) -> rusqlite::Result<OutboxRecord> {
    Ok(OutboxRecord {
        uuid: parse_uuid(0, row.get(0)?)?,
        kind: row.get(1)?,
        message_type: row.get(2)?,
        publisher: row.get(3)?,
        serialized_message: row.get(4)?,
        group_id: row.get(5)?,
        deduplication_id: row.get(6)?,
        sending_error: row.get(7)?,
        created_at: parse_datetime(8, row.get(8)?)?,
    })
}

fn inbox_from_row(row: &Row<'_>) -> rusqlite::Result<InboxRecord> {
    Ok(InboxRecord {
        uuid: parse_uuid(0, row.get(0)?)?,
        kind: row.get(1)?,
        message_type: row.get(2)?,
        publisher: row.get(3)?,
        data: row.get(4)?,
        version: row.get(5)?,
        sent_at: row.get(6)?,
        request_id: row.get(7)?,
        subject: row.get(8)?,
        object: row.get(9)?,
        client_error_message: row.get(10)?,
        client_error_details: row.get(11)?,
        received_at: parse_datetime(12, row.get(12)?)?,
        processed_at: row
            .get::<_, Option<String>>(13)?
            .map(|s| parse_datetime(13, s))
            .transpose()?,
    })
}

fn parse_uuid(idx: usize, s: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_datetime(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(uuid: Uuid) -> NewOutboxRecord {
        NewOutboxRecord {
            uuid,
            kind: "event".to_string(),
            message_type: "note_added".to_string(),
            publisher: "sample_app".to_string(),
            serialized_message: "{}".to_string(),
            group_id: None,
            deduplication_id: None,
        }
    }

    #[test]
    fn test_open_on_disk_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("lariat.db");
        let uuid = Uuid::new_v4();

        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_outbox(&record(uuid)).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.get_outbox(uuid).unwrap().is_some());
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let store = SqliteStore::open_in_memory().unwrap();
        let uuid = Uuid::new_v4();

        store
            .with_transaction(|tx| SqliteStore::insert_outbox_on(tx, &[record(uuid)]))
            .unwrap();
        assert_eq!(store.count_outbox().unwrap(), 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_err() {
        let store = SqliteStore::open_in_memory().unwrap();

        let result: DatabaseResult<()> = store.with_transaction(|tx| {
            SqliteStore::insert_outbox_on(tx, &[record(Uuid::new_v4())])?;
            Err(DatabaseError::Connection("abort".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(store.count_outbox().unwrap(), 0);
    }

    #[test]
    fn test_transaction_sees_domain_tables() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .with_transaction(|tx| -> DatabaseResult<()> {
                tx.execute_batch("CREATE TABLE notes (id TEXT PRIMARY KEY, body TEXT)")?;
                tx.execute("INSERT INTO notes VALUES ('n1', 'hello')", [])?;
                SqliteStore::insert_outbox_on(tx, &[record(Uuid::new_v4())])
            })
            .unwrap();
        assert_eq!(store.count_outbox().unwrap(), 1);
    }

    #[test]
    fn test_only_primary_key_conflicts_are_duplicates() {
        let store = SqliteStore::open_in_memory().unwrap();
        let uuid = Uuid::new_v4();
        store.insert_outbox(&record(uuid)).unwrap();
        assert!(matches!(
            store.insert_outbox(&record(uuid)),
            Err(DatabaseError::DuplicateKey(_))
        ));

        let conn = store.conn().unwrap();
        let not_null = conn
            .execute("INSERT INTO lariat_outbox (uuid, kind) VALUES ('x', NULL)", [])
            .unwrap_err();
        assert!(matches!(insert_error(not_null, uuid), DatabaseError::Sqlite(_)));
    }

    #[test]
    fn test_created_at_sorts_lexicographically() {
        let early = "2024-01-01T00:00:00.000001Z".parse::<DateTime<Utc>>().unwrap();
        let late = "2024-01-01T00:00:00.100000Z".parse::<DateTime<Utc>>().unwrap();
        assert!(format_datetime(early) < format_datetime(late));
        assert_eq!(format_datetime(early).len(), format_datetime(late).len());
    }
}
