//! Database migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.

use crate::{DatabaseError, DatabaseResult};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version > CURRENT_VERSION {
        return Err(DatabaseError::Migration(format!(
            "database schema v{current_version} is newer than supported v{CURRENT_VERSION}"
        )));
    }

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_outbox(conn)?;
    }
    if current_version < 2 {
        migrate_v2_inbox(conn)?;
    }

    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: outgoing messages awaiting broker confirmation.
fn migrate_v1_outbox(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v1: outbox");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS lariat_outbox (
            uuid TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            type TEXT NOT NULL,
            publisher TEXT NOT NULL,
            serialized_message TEXT NOT NULL,
            group_id TEXT,
            deduplication_id TEXT,
            sending_error TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_lariat_outbox_created_at
            ON lariat_outbox(created_at);
        ",
    )?;

    record_migration(conn, 1, "outbox")?;
    Ok(())
}

/// V2: received messages and their processing outcome.
fn migrate_v2_inbox(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v2: inbox");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS lariat_inbox (
            uuid TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            type TEXT NOT NULL,
            publisher TEXT NOT NULL,
            data TEXT NOT NULL DEFAULT '{}',
            version INTEGER NOT NULL,
            sent_at TEXT NOT NULL,
            request_id TEXT,
            subject TEXT,
            object TEXT,
            client_error_message TEXT,
            client_error_details TEXT,
            received_at TEXT NOT NULL,
            processed_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_lariat_inbox_processed_at
            ON lariat_inbox(processed_at);
        CREATE INDEX IF NOT EXISTS idx_lariat_inbox_received_at
            ON lariat_inbox(received_at);
        ",
    )?;

    record_migration(conn, 2, "inbox")?;
    Ok(())
}
