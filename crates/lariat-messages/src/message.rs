//! Message envelope types.

use crate::validator::Validator;
use crate::{MessageError, MessageResult, Timestamp};
use lariat_core::{Config, MessageKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use tracing::warn;
use uuid::Uuid;

/// Reference to a domain entity: `{"type": ..., "uuid": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub uuid: String,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            uuid: uuid.into(),
        }
    }

    fn from_value(value: &Value) -> Self {
        Self {
            entity_type: string_field(value.get("type")),
            uuid: string_field(value.get("uuid")),
        }
    }

    fn to_value(&self) -> Value {
        json!({ "type": self.entity_type, "uuid": self.uuid })
    }

    fn check(&self, v: &mut Validator, type_field: &'static str, uuid_field: &'static str) {
        v.required(type_field, &self.entity_type);
        v.uuid(uuid_field, &self.uuid);
    }
}

/// Who sent a message. V1 only allows a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Publisher {
    Name(String),
    Entity(EntityRef),
}

impl Publisher {
    /// Name used when addressing the publisher's topics.
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Entity(entity) => &entity.entity_type,
        }
    }

    fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(entity @ Value::Object(_)) => Self::Entity(EntityRef::from_value(entity)),
            other => Self::Name(string_field(other)),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Name(name) => Value::String(name.clone()),
            Self::Entity(entity) => entity.to_value(),
        }
    }
}

impl From<&str> for Publisher {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for Publisher {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<EntityRef> for Publisher {
    fn from(entity: EntityRef) -> Self {
        Self::Entity(entity)
    }
}

/// Business-rule failure reported by a message handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl ClientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    fn from_value(value: &Value) -> Option<Self> {
        let message = value.get("message")?.as_str()?.to_string();
        let details = value.get("details").cloned().unwrap_or(Value::Null);
        Some(Self { message, details })
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("message".into(), Value::String(self.message.clone()));
        if !self.details.is_null() {
            map.insert("details".into(), self.details.clone());
        }
        Value::Object(map)
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Fields common to every schema version.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub kind: MessageKind,
    pub uuid: String,
    /// Type without the kind prefix, e.g. `create_user`.
    pub message_type: String,
    pub version: i64,
    pub data: Value,
    pub request_id: Option<String>,
    pub sent_at: Timestamp,
    pub received_at: Option<Timestamp>,
    pub processed_at: Option<Timestamp>,
    pub group_id: Option<String>,
    pub deduplication_id: Option<String>,
    pub client_error: Option<ClientError>,
}

impl Envelope {
    fn new(kind: MessageKind, message_type: String, version: i64, data: Value) -> Self {
        Self {
            kind,
            uuid: Uuid::new_v4().to_string(),
            message_type,
            version,
            data,
            request_id: None,
            sent_at: Timestamp::now(),
            received_at: None,
            processed_at: None,
            group_id: None,
            deduplication_id: None,
            client_error: None,
        }
    }

    fn from_fields(kind: MessageKind, fields: &Map<String, Value>) -> Self {
        Self {
            kind,
            uuid: string_field(fields.get("uuid")),
            message_type: string_field(fields.get("type")),
            version: fields.get("version").and_then(parse_version).unwrap_or(0),
            data: match fields.get("data") {
                None | Some(Value::Null) => Value::Object(Map::new()),
                Some(data) => data.clone(),
            },
            request_id: optional_string(fields.get("request_id")),
            sent_at: timestamp_field(fields.get("sent_at"))
                .unwrap_or_else(|| Timestamp::Invalid(String::new())),
            received_at: timestamp_field(fields.get("received_at")),
            processed_at: timestamp_field(fields.get("processed_at")),
            group_id: optional_string(fields.get("group_id")),
            deduplication_id: optional_string(fields.get("deduplication_id")),
            client_error: fields.get("client_error").and_then(ClientError::from_value),
        }
    }

    fn check(&self, v: &mut Validator, expected_version: i64) {
        v.uuid("uuid", &self.uuid);
        v.required("type", &self.message_type);
        v.version(self.version, expected_version);
        v.mapping("data", &self.data);
        v.optional_uuid("request_id", self.request_id.as_deref());
        v.timestamp("sent_at", &self.sent_at);
        v.optional_timestamp("received_at", self.received_at.as_ref());
        v.optional_timestamp("processed_at", self.processed_at.as_ref());
        v.optional_non_empty("group_id", self.group_id.as_deref());
        v.optional_non_empty("deduplication_id", self.deduplication_id.as_deref());
    }

    /// `<kind>_<type>` as written on the wire.
    pub fn wire_type(&self) -> String {
        format!("{}_{}", self.kind, self.message_type)
    }

    fn write_head(&self, map: &mut Map<String, Value>, publisher: Value) {
        map.insert("uuid".into(), Value::String(self.uuid.clone()));
        map.insert("publisher".into(), publisher);
        map.insert("type".into(), Value::String(self.wire_type()));
        map.insert("version".into(), Value::from(self.version));
        map.insert("data".into(), self.data.clone());
        if let Some(request_id) = &self.request_id {
            map.insert("request_id".into(), Value::String(request_id.clone()));
        }
        if !matches!(&self.sent_at, Timestamp::Invalid(raw) if raw.is_empty()) {
            map.insert("sent_at".into(), Value::String(self.sent_at.render()));
        }
    }

    fn write_tail(&self, map: &mut Map<String, Value>) {
        if let Some(received_at) = &self.received_at {
            map.insert("received_at".into(), Value::String(received_at.render()));
        }
        if let Some(processed_at) = &self.processed_at {
            map.insert("processed_at".into(), Value::String(processed_at.render()));
        }
        if let Some(group_id) = &self.group_id {
            map.insert("group_id".into(), Value::String(group_id.clone()));
        }
        if let Some(deduplication_id) = &self.deduplication_id {
            map.insert("deduplication_id".into(), Value::String(deduplication_id.clone()));
        }
        if let Some(client_error) = &self.client_error {
            map.insert("client_error".into(), client_error.to_value());
        }
    }
}

/// Schema version 1: string publisher, no entity references.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageV1 {
    pub envelope: Envelope,
    pub publisher: String,
}

impl MessageV1 {
    pub const VERSION: i64 = 1;

    /// New message with a fresh uuid, sent now.
    pub fn new(
        kind: MessageKind,
        publisher: impl Into<String>,
        message_type: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            envelope: Envelope::new(kind, message_type.into(), Self::VERSION, data),
            publisher: publisher.into(),
        }
    }

    /// Construct from a field mapping. Does not validate; `type` must already
    /// be stripped of its kind prefix.
    pub fn from_fields(kind: MessageKind, fields: &Map<String, Value>) -> Self {
        Self {
            envelope: Envelope::from_fields(kind, fields),
            publisher: string_field(fields.get("publisher")),
        }
    }

    pub fn validate(&self) -> MessageResult<()> {
        let mut v = Validator::default();
        self.envelope.check(&mut v, Self::VERSION);
        v.required("publisher", &self.publisher);
        v.finish().map_err(|errors| MessageError::InvalidMessage { errors })
    }

    pub fn serialize(&self) -> Map<String, Value> {
        let mut map = Map::new();
        self.envelope
            .write_head(&mut map, Value::String(self.publisher.clone()));
        self.envelope.write_tail(&mut map);
        map
    }
}

/// Schema version 2: adds the acting `subject` and acted-upon `object`.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageV2 {
    pub envelope: Envelope,
    pub publisher: Publisher,
    pub subject: Option<EntityRef>,
    pub object: Option<EntityRef>,
}

impl MessageV2 {
    pub const VERSION: i64 = 2;

    pub fn new(
        kind: MessageKind,
        publisher: impl Into<Publisher>,
        message_type: impl Into<String>,
        data: Value,
        subject: EntityRef,
        object: EntityRef,
    ) -> Self {
        Self {
            envelope: Envelope::new(kind, message_type.into(), Self::VERSION, data),
            publisher: publisher.into(),
            subject: Some(subject),
            object: Some(object),
        }
    }

    /// Construct from a field mapping. Does not validate; `type` must already
    /// be stripped of its kind prefix.
    pub fn from_fields(kind: MessageKind, fields: &Map<String, Value>) -> Self {
        let entity = |key: &str| {
            fields
                .get(key)
                .filter(|v| !v.is_null())
                .map(EntityRef::from_value)
        };
        Self {
            envelope: Envelope::from_fields(kind, fields),
            publisher: Publisher::from_value(fields.get("publisher")),
            subject: entity("subject"),
            object: entity("object"),
        }
    }

    pub fn with_subject(mut self, subject: EntityRef) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn with_object(mut self, object: EntityRef) -> Self {
        self.object = Some(object);
        self
    }

    pub fn validate(&self) -> MessageResult<()> {
        let mut v = Validator::default();
        self.envelope.check(&mut v, Self::VERSION);
        match &self.publisher {
            Publisher::Name(name) => {
                v.required("publisher", name);
            }
            Publisher::Entity(entity) => entity.check(&mut v, "publisher.type", "publisher.uuid"),
        }
        match &self.subject {
            Some(subject) => subject.check(&mut v, "subject.type", "subject.uuid"),
            None => v.fail("subject", "is missing"),
        }
        match &self.object {
            Some(object) => object.check(&mut v, "object.type", "object.uuid"),
            None => v.fail("object", "is missing"),
        }
        v.finish().map_err(|errors| MessageError::InvalidMessage { errors })
    }

    pub fn serialize(&self) -> Map<String, Value> {
        let mut map = Map::new();
        self.envelope.write_head(&mut map, self.publisher.to_value());
        if let Some(subject) = &self.subject {
            map.insert("subject".into(), subject.to_value());
        }
        if let Some(object) = &self.object {
            map.insert("object".into(), object.to_value());
        }
        self.envelope.write_tail(&mut map);
        map
    }
}

/// An event or command at any supported schema version.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    V1(MessageV1),
    V2(MessageV2),
}

impl Message {
    /// New event at the configured schema version, published as `config.publisher`.
    ///
    /// Version 2 messages start without `subject`/`object`; set them with
    /// [`MessageV2::with_subject`] and [`MessageV2::with_object`] before validating.
    pub fn event(config: &Config, message_type: impl Into<String>, data: Value) -> Self {
        Self::for_config(config, MessageKind::Event, message_type.into(), data)
    }

    /// New command at the configured schema version.
    pub fn command(config: &Config, message_type: impl Into<String>, data: Value) -> Self {
        Self::for_config(config, MessageKind::Command, message_type.into(), data)
    }

    /// An unsupported `config.version` yields a message carrying that version,
    /// which fails validation, so it can be neither stored nor published.
    fn for_config(config: &Config, kind: MessageKind, message_type: String, data: Value) -> Self {
        match i64::from(config.version) {
            MessageV1::VERSION => {
                Self::V1(MessageV1::new(kind, config.publisher.clone(), message_type, data))
            }
            MessageV2::VERSION => Self::V2(MessageV2 {
                envelope: Envelope::new(kind, message_type, MessageV2::VERSION, data),
                publisher: Publisher::Name(config.publisher.clone()),
                subject: None,
                object: None,
            }),
            unsupported => {
                warn!(version = unsupported, "Unsupported schema version in config");
                Self::V1(MessageV1 {
                    envelope: Envelope::new(kind, message_type, unsupported, data),
                    publisher: config.publisher.clone(),
                })
            }
        }
    }

    pub fn envelope(&self) -> &Envelope {
        match self {
            Self::V1(m) => &m.envelope,
            Self::V2(m) => &m.envelope,
        }
    }

    pub fn envelope_mut(&mut self) -> &mut Envelope {
        match self {
            Self::V1(m) => &mut m.envelope,
            Self::V2(m) => &mut m.envelope,
        }
    }

    pub fn uuid(&self) -> &str {
        &self.envelope().uuid
    }

    /// The uuid parsed, when it is a valid UUID.
    pub fn id(&self) -> Option<Uuid> {
        Uuid::try_parse(self.uuid()).ok()
    }

    pub fn kind(&self) -> MessageKind {
        self.envelope().kind
    }

    pub fn message_type(&self) -> &str {
        &self.envelope().message_type
    }

    pub fn wire_type(&self) -> String {
        self.envelope().wire_type()
    }

    pub fn version(&self) -> i64 {
        self.envelope().version
    }

    pub fn publisher_name(&self) -> &str {
        match self {
            Self::V1(m) => &m.publisher,
            Self::V2(m) => m.publisher.name(),
        }
    }

    pub fn data(&self) -> &Value {
        &self.envelope().data
    }

    pub fn request_id(&self) -> Option<&str> {
        self.envelope().request_id.as_deref()
    }

    pub fn sent_at(&self) -> &Timestamp {
        &self.envelope().sent_at
    }

    pub fn received_at(&self) -> Option<&Timestamp> {
        self.envelope().received_at.as_ref()
    }

    pub fn processed_at(&self) -> Option<&Timestamp> {
        self.envelope().processed_at.as_ref()
    }

    pub fn is_processed(&self) -> bool {
        self.envelope().processed_at.is_some()
    }

    pub fn group_id(&self) -> Option<&str> {
        self.envelope().group_id.as_deref()
    }

    pub fn deduplication_id(&self) -> Option<&str> {
        self.envelope().deduplication_id.as_deref()
    }

    pub fn client_error(&self) -> Option<&ClientError> {
        self.envelope().client_error.as_ref()
    }

    /// FIFO messages carry a group id.
    pub fn fifo(&self) -> bool {
        self.envelope().group_id.is_some()
    }

    pub fn set_received_at(&mut self, at: Timestamp) {
        self.envelope_mut().received_at = Some(at);
    }

    pub fn set_processed_at(&mut self, at: Timestamp) {
        self.envelope_mut().processed_at = Some(at);
    }

    pub fn set_client_error(&mut self, error: Option<ClientError>) {
        self.envelope_mut().client_error = error;
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.envelope_mut().request_id = Some(request_id.to_string());
        self
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.envelope_mut().group_id = Some(group_id.into());
        self
    }

    pub fn with_deduplication_id(mut self, deduplication_id: impl Into<String>) -> Self {
        self.envelope_mut().deduplication_id = Some(deduplication_id.into());
        self
    }

    /// Check every field, reporting all failures at once.
    pub fn validate(&self) -> MessageResult<()> {
        match self {
            Self::V1(m) => m.validate(),
            Self::V2(m) => m.validate(),
        }
    }

    /// Canonical ordered wire mapping. Absent fields are omitted.
    pub fn serialize(&self) -> Map<String, Value> {
        match self {
            Self::V1(m) => m.serialize(),
            Self::V2(m) => m.serialize(),
        }
    }

    pub fn to_json(&self) -> MessageResult<String> {
        Ok(serde_json::to_string(&self.serialize())?)
    }
}

impl From<MessageV1> for Message {
    fn from(message: MessageV1) -> Self {
        Self::V1(message)
    }
}

impl From<MessageV2> for Message {
    fn from(message: MessageV2) -> Self {
        Self::V2(message)
    }
}

/// Integer version from a JSON number or numeric string.
pub(crate) fn parse_version(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_field(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn optional_string(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        other => Some(string_field(other)),
    }
}

fn timestamp_field(value: Option<&Value>) -> Option<Timestamp> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => Some(Timestamp::parse(raw)),
        Some(other) => Some(Timestamp::Invalid(other.to_string())),
    }
}
