//! Protocol-agnostic resource handle and creation tags.

use crate::naming::{split_arn, StandardName};
use crate::{Protocol, Queue, ResourceResult, Topic};
use std::fmt;

/// Key/value tag attached to a resource at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    pub key: &'static str,
    pub value: String,
}

impl Tag {
    fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }

    pub(crate) fn standard_set(standard: &StandardName, fifo: bool, with_dest: bool) -> Vec<Tag> {
        let mut tags = vec![
            Tag::new("instance", standard.instance.as_str()),
            Tag::new("kind", standard.kind.as_str()),
            Tag::new("publisher", standard.publisher.as_str()),
            Tag::new("type", standard.message_type.as_str()),
            Tag::new("fifo", fifo.to_string()),
        ];
        if with_dest {
            tags.push(Tag::new("dest", standard.dest.as_deref().unwrap_or("undefined")));
        }
        tags
    }
}

/// A topic or a queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    Topic(Topic),
    Queue(Queue),
}

impl Resource {
    /// Parse an ARN of either protocol.
    pub fn from_arn(arn: &str) -> ResourceResult<Self> {
        let (protocol, _, _, _) = split_arn(arn)?;
        match protocol {
            Protocol::Sns => Topic::from_arn(arn).map(Resource::Topic),
            Protocol::Sqs => Queue::from_arn(arn).map(Resource::Queue),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Topic(_) => Protocol::Sns,
            Self::Queue(_) => Protocol::Sqs,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Topic(topic) => topic.name(),
            Self::Queue(queue) => queue.name(),
        }
    }

    pub fn arn(&self) -> String {
        match self {
            Self::Topic(topic) => topic.arn(),
            Self::Queue(queue) => queue.arn(),
        }
    }

    pub fn is_fifo(&self) -> bool {
        match self {
            Self::Topic(topic) => topic.is_fifo(),
            Self::Queue(queue) => queue.is_fifo(),
        }
    }

    pub fn tags(&self) -> Vec<Tag> {
        match self {
            Self::Topic(topic) => topic.tags(),
            Self::Queue(queue) => queue.tags(),
        }
    }
}

impl From<Topic> for Resource {
    fn from(topic: Topic) -> Self {
        Self::Topic(topic)
    }
}

impl From<Queue> for Resource {
    fn from(queue: Queue) -> Self {
        Self::Queue(queue)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.protocol(), self.name())
    }
}
