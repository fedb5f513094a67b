//! Fanout topics.

use crate::naming::{parse_standard, render_arn, split_arn_for, split_fifo, StandardName};
use crate::{Protocol, ResourceResult, Tag};
use lariat_core::MessageKind;
use std::fmt;

/// A fanout topic address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    standard: Option<StandardName>,
    fifo: bool,
    region: String,
    account_id: String,
    name: String,
}

impl Topic {
    pub const PROTOCOL: Protocol = Protocol::Sns;

    /// Build a standard topic from its structured fields.
    pub fn new(
        instance: impl Into<String>,
        kind: MessageKind,
        publisher: impl Into<String>,
        message_type: impl Into<String>,
        fifo: bool,
        region: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Self {
        let standard = StandardName {
            instance: instance.into(),
            kind,
            publisher: publisher.into(),
            message_type: message_type.into(),
            dest: None,
        };
        let name = standard.render(Self::PROTOCOL, fifo);
        Self {
            standard: Some(standard),
            fifo,
            region: region.into(),
            account_id: account_id.into(),
            name,
        }
    }

    /// Address a topic by name. Names outside the standard grammar become custom topics.
    pub fn from_name(
        name: &str,
        region: impl Into<String>,
        account_id: impl Into<String>,
    ) -> ResourceResult<Self> {
        let (base, fifo) = split_fifo(name)?;
        Ok(Self {
            standard: parse_standard(base, Self::PROTOCOL),
            fifo,
            region: region.into(),
            account_id: account_id.into(),
            name: name.to_string(),
        })
    }

    /// Address a topic by opaque name, skipping standard-name parsing.
    pub fn custom(
        name: &str,
        region: impl Into<String>,
        account_id: impl Into<String>,
    ) -> ResourceResult<Self> {
        let (_, fifo) = split_fifo(name)?;
        Ok(Self {
            standard: None,
            fifo,
            region: region.into(),
            account_id: account_id.into(),
            name: name.to_string(),
        })
    }

    /// Parse `arn:aws:sns:<region>:<account_id>:<name>`.
    pub fn from_arn(arn: &str) -> ResourceResult<Self> {
        let (region, account_id, name) = split_arn_for(arn, Self::PROTOCOL)?;
        Self::from_name(name, region, account_id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arn(&self) -> String {
        render_arn(Self::PROTOCOL, &self.region, &self.account_id, &self.name)
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn instance(&self) -> Option<&str> {
        self.standard.as_ref().map(|s| s.instance.as_str())
    }

    pub fn kind(&self) -> Option<MessageKind> {
        self.standard.as_ref().map(|s| s.kind)
    }

    pub fn publisher(&self) -> Option<&str> {
        self.standard.as_ref().map(|s| s.publisher.as_str())
    }

    pub fn message_type(&self) -> Option<&str> {
        self.standard.as_ref().map(|s| s.message_type.as_str())
    }

    pub fn is_fifo(&self) -> bool {
        self.fifo
    }

    pub fn is_standard(&self) -> bool {
        self.standard.is_some()
    }

    pub fn is_custom(&self) -> bool {
        self.standard.is_none()
    }

    /// Tags attached when the topic is created. Custom topics carry none.
    pub fn tags(&self) -> Vec<Tag> {
        match &self.standard {
            Some(standard) => Tag::standard_set(standard, self.fifo, false),
            None => Vec::new(),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
