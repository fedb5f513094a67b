//! Storage row types.
//!
//! Rows carry message fields as plain strings so the storage layer stays
//! independent of the message schema.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use uuid::Uuid;

/// Outbox row to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOutboxRecord {
    pub uuid: Uuid,
    pub kind: String,
    pub message_type: String,
    pub publisher: String,
    /// Full wire JSON of the message.
    pub serialized_message: String,
    pub group_id: Option<String>,
    pub deduplication_id: Option<String>,
}

/// Outbox row - a message waiting for broker confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxRecord {
    pub uuid: Uuid,
    pub kind: String,
    pub message_type: String,
    pub publisher: String,
    pub serialized_message: String,
    pub group_id: Option<String>,
    pub deduplication_id: Option<String>,
    pub sending_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OutboxRecord {
    pub(crate) fn from_new(record: &NewOutboxRecord, created_at: DateTime<Utc>) -> Self {
        Self {
            uuid: record.uuid,
            kind: record.kind.clone(),
            message_type: record.message_type.clone(),
            publisher: record.publisher.clone(),
            serialized_message: record.serialized_message.clone(),
            group_id: record.group_id.clone(),
            deduplication_id: record.deduplication_id.clone(),
            sending_error: None,
            created_at,
        }
    }
}

/// Inbox row to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInboxRecord {
    pub uuid: Uuid,
    pub kind: String,
    pub message_type: String,
    /// Publisher name, or the JSON of a publisher entity.
    pub publisher: String,
    /// JSON payload.
    pub data: String,
    pub version: i64,
    pub sent_at: String,
    pub request_id: Option<String>,
    /// JSON `{type, uuid}` of the acting entity.
    pub subject: Option<String>,
    /// JSON `{type, uuid}` of the acted-upon entity.
    pub object: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Inbox row - a received message and its processing outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxRecord {
    pub uuid: Uuid,
    pub kind: String,
    pub message_type: String,
    pub publisher: String,
    pub data: String,
    pub version: i64,
    pub sent_at: String,
    pub request_id: Option<String>,
    pub subject: Option<String>,
    pub object: Option<String>,
    pub client_error_message: Option<String>,
    /// JSON details of the client error.
    pub client_error_details: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl InboxRecord {
    pub(crate) fn from_new(record: &NewInboxRecord) -> Self {
        Self {
            uuid: record.uuid,
            kind: record.kind.clone(),
            message_type: record.message_type.clone(),
            publisher: record.publisher.clone(),
            data: record.data.clone(),
            version: record.version,
            sent_at: record.sent_at.clone(),
            request_id: record.request_id.clone(),
            subject: record.subject.clone(),
            object: record.object.clone(),
            client_error_message: None,
            client_error_details: None,
            received_at: truncate(record.received_at),
            processed_at: None,
        }
    }

    /// Handled, successfully or with a client error.
    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }
}

/// Business failure recorded against an inbox row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientErrorRecord {
    pub message: String,
    pub details: Option<String>,
}

/// Current time at the precision rows are stored with.
pub(crate) fn now() -> DateTime<Utc> {
    truncate(Utc::now())
}

pub(crate) fn truncate(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

/// Fixed-width RFC3339 so stored timestamps sort lexicographically.
pub(crate) fn format_datetime(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
