//! Name and ARN grammar shared by topics and queues.

use crate::{ResourceError, ResourceResult};
use lariat_core::MessageKind;
use std::fmt;

/// Suffix appended to FIFO resource names.
pub const FIFO_SUFFIX: &str = ".fifo";

const ARN_PREFIX: &str = "arn:aws:";

/// Broker service a resource lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Fanout topics.
    Sns,
    /// Queues.
    Sqs,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sns => "sns",
            Self::Sqs => "sqs",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sns" => Some(Self::Sns),
            "sqs" => Some(Self::Sqs),
            _ => None,
        }
    }

    /// Literal between kind and publisher in standard names.
    pub fn name_suffix(&self) -> &'static str {
        match self {
            Self::Sns => "fanout",
            Self::Sqs => "queue",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured fields of a standard resource name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct StandardName {
    pub instance: String,
    pub kind: MessageKind,
    pub publisher: String,
    pub message_type: String,
    pub dest: Option<String>,
}

impl StandardName {
    pub fn render(&self, protocol: Protocol, fifo: bool) -> String {
        let mut name = [
            self.instance.as_str(),
            self.kind.as_str(),
            protocol.name_suffix(),
            self.publisher.as_str(),
            self.message_type.as_str(),
        ]
        .join("-");
        if let Some(dest) = &self.dest {
            name.push('-');
            name.push_str(dest);
        }
        if fifo {
            name.push_str(FIFO_SUFFIX);
        }
        name
    }
}

/// Split a resource name into its base and FIFO flag.
///
/// The only suffix a name may carry is `.fifo`.
pub(crate) fn split_fifo(name: &str) -> ResourceResult<(&str, bool)> {
    let (base, fifo) = match name.strip_suffix(FIFO_SUFFIX) {
        Some(base) => (base, true),
        None => (name, false),
    };
    if base.is_empty() {
        return Err(ResourceError::InvalidResourceFormat(format!(
            "empty resource name: {name:?}"
        )));
    }
    if base.contains('.') {
        return Err(ResourceError::InvalidResourceFormat(format!(
            "unexpected suffix in resource name: {name}"
        )));
    }
    Ok((base, fifo))
}

/// Parse the base of a name (no `.fifo`) against the standard grammar.
///
/// Returns `None` when the name is not standard; callers treat it as custom.
pub(crate) fn parse_standard(base: &str, protocol: Protocol) -> Option<StandardName> {
    let parts: Vec<&str> = base.split('-').collect();
    let dest = match (protocol, parts.len()) {
        (_, 5) => None,
        (Protocol::Sqs, 6) => Some(parts[5].to_string()),
        _ => return None,
    };
    if parts.iter().any(|part| part.is_empty()) || parts[2] != protocol.name_suffix() {
        return None;
    }
    let kind = MessageKind::parse(parts[1])?;
    Some(StandardName {
        instance: parts[0].to_string(),
        kind,
        publisher: parts[3].to_string(),
        message_type: parts[4].to_string(),
        dest,
    })
}

pub(crate) fn render_arn(protocol: Protocol, region: &str, account_id: &str, name: &str) -> String {
    format!("{ARN_PREFIX}{}:{region}:{account_id}:{name}", protocol.as_str())
}

/// Components of an ARN: `(protocol, region, account_id, name)`.
pub(crate) fn split_arn(arn: &str) -> ResourceResult<(Protocol, &str, &str, &str)> {
    let invalid = || ResourceError::InvalidResourceFormat(format!("invalid ARN: {arn}"));

    let rest = arn.strip_prefix(ARN_PREFIX).ok_or_else(invalid)?;
    let mut parts = rest.splitn(4, ':');
    let protocol = parts.next().and_then(Protocol::parse).ok_or_else(invalid)?;
    let region = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    let account_id = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    let name = parts.next().filter(|s| !s.is_empty() && !s.contains(':')).ok_or_else(invalid)?;
    Ok((protocol, region, account_id, name))
}

/// Like [`split_arn`] but rejects ARNs of the other protocol.
pub(crate) fn split_arn_for(
    arn: &str,
    expected: Protocol,
) -> ResourceResult<(&str, &str, &str)> {
    let (protocol, region, account_id, name) = split_arn(arn)?;
    if protocol != expected {
        return Err(ResourceError::InvalidResourceFormat(format!(
            "expected an arn:aws:{expected}: ARN, got {arn}"
        )));
    }
    Ok((region, account_id, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_fifo_accepts_plain_and_fifo_names() {
        assert_eq!(split_fifo("a-b").unwrap(), ("a-b", false));
        assert_eq!(split_fifo("a-b.fifo").unwrap(), ("a-b", true));
    }

    #[test]
    fn split_fifo_rejects_other_suffixes() {
        assert!(split_fifo("a-b.json").is_err());
        assert!(split_fifo("a.b.fifo").is_err());
        assert!(split_fifo(".fifo").is_err());
        assert!(split_fifo("").is_err());
    }

    #[test]
    fn parse_standard_topic_requires_five_parts() {
        let parsed = parse_standard("test-event-fanout-app-created", Protocol::Sns).unwrap();
        assert_eq!(parsed.instance, "test");
        assert_eq!(parsed.kind, MessageKind::Event);
        assert_eq!(parsed.dest, None);

        assert!(parse_standard("test-event-fanout-app-created-extra", Protocol::Sns).is_none());
        assert!(parse_standard("test-event-queue-app-created", Protocol::Sns).is_none());
        assert!(parse_standard("test-query-fanout-app-created", Protocol::Sns).is_none());
        assert!(parse_standard("test-event-fanout--created", Protocol::Sns).is_none());
    }

    #[test]
    fn parse_standard_queue_accepts_dest() {
        let parsed = parse_standard("test-command-queue-app-sync-billing", Protocol::Sqs).unwrap();
        assert_eq!(parsed.kind, MessageKind::Command);
        assert_eq!(parsed.dest.as_deref(), Some("billing"));
    }

    #[test]
    fn split_arn_components() {
        let (protocol, region, account, name) =
            split_arn("arn:aws:sns:eu-west-1:123:my-topic").unwrap();
        assert_eq!(protocol, Protocol::Sns);
        assert_eq!(region, "eu-west-1");
        assert_eq!(account, "123");
        assert_eq!(name, "my-topic");
    }

    #[test]
    fn split_arn_rejects_malformed() {
        assert!(split_arn("arn:aws:s3:eu-west-1:123:bucket").is_err());
        assert!(split_arn("arn:aws-cn:sns:eu-west-1:123:t").is_err());
        assert!(split_arn("arn:aws:sns:eu-west-1:123").is_err());
        assert!(split_arn("arn:aws:sns::123:t").is_err());
        assert!(split_arn("my-topic").is_err());
        assert!(split_arn_for("arn:aws:sqs:eu-west-1:123:q", Protocol::Sns).is_err());
    }
}
