//! Rebuild typed messages from untyped JSON.
//!
//! Broker payloads and storage rows carry messages as plain JSON. This is the
//! one place that maps them back onto a `(kind, version)` schema.

use crate::message::parse_version;
use crate::{Message, MessageError, MessageResult, MessageV1, MessageV2};
use lariat_core::MessageKind;
use serde_json::Value;
use tracing::trace;

/// Build a message from a wire or storage mapping. Does not validate.
///
/// The kind comes from an explicit `kind` field when present, otherwise from
/// the `type` prefix (`event_create_user` → `event`).
pub fn build(raw: &Value) -> MessageResult<Message> {
    let fields = raw.as_object().ok_or(MessageError::NotAnObject)?;

    let raw_type = fields.get("type").and_then(Value::as_str).unwrap_or_default();
    let kind_tag = match fields.get("kind").and_then(Value::as_str) {
        Some(kind) => kind,
        None => raw_type.split('_').next().unwrap_or_default(),
    };
    let kind = MessageKind::parse(kind_tag)
        .ok_or_else(|| MessageError::UnknownMessageKind(kind_tag.to_string()))?;

    let prefix = format!("{kind}_");
    let message_type = raw_type.strip_prefix(&prefix).unwrap_or(raw_type);
    let mut fields = fields.clone();
    fields.insert("type".into(), Value::String(message_type.to_string()));
    fields.remove("kind");

    let version = fields.get("version").and_then(parse_version);
    trace!(kind = %kind, version = ?version, message_type, "Building message");
    match version {
        Some(MessageV1::VERSION) => Ok(MessageV1::from_fields(kind, &fields).into()),
        Some(MessageV2::VERSION) => Ok(MessageV2::from_fields(kind, &fields).into()),
        _ => Err(MessageError::UnknownMessageVersion {
            kind,
            version: fields
                .get("version")
                .map(|v| v.to_string())
                .unwrap_or_else(|| "none".to_string()),
        }),
    }
}

/// Parse a JSON string and [`build`] it.
pub fn build_str(raw: &str) -> MessageResult<Message> {
    let value: Value = serde_json::from_str(raw)?;
    build(&value)
}
