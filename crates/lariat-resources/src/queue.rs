//! Queues.

use crate::naming::{parse_standard, render_arn, split_arn_for, split_fifo, StandardName};
use crate::{Protocol, ResourceError, ResourceResult, Tag};
use lariat_core::MessageKind;
use std::fmt;
use url::Url;

const HOST_SUFFIX: &str = ".amazonaws.com";

/// A queue address. `dest` disambiguates queues of different consumers
/// subscribed to the same message type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Queue {
    standard: Option<StandardName>,
    fifo: bool,
    region: String,
    account_id: String,
    name: String,
}

impl Queue {
    pub const PROTOCOL: Protocol = Protocol::Sqs;

    /// Build a standard queue from its structured fields.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance: impl Into<String>,
        kind: MessageKind,
        publisher: impl Into<String>,
        message_type: impl Into<String>,
        dest: Option<String>,
        fifo: bool,
        region: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Self {
        let standard = StandardName {
            instance: instance.into(),
            kind,
            publisher: publisher.into(),
            message_type: message_type.into(),
            dest,
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

    /// Address a queue by name. Names outside the standard grammar become custom queues.
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

    /// Address a queue by opaque name, skipping standard-name parsing.
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

    /// Parse `arn:aws:sqs:<region>:<account_id>:<name>`.
    pub fn from_arn(arn: &str) -> ResourceResult<Self> {
        let (region, account_id, name) = split_arn_for(arn, Self::PROTOCOL)?;
        Self::from_name(name, region, account_id)
    }

    /// Parse a queue URL.
    ///
    /// Accepts `https://sqs.<region>.amazonaws.com/<account_id>/<name>` and the
    /// legacy `https://<region>.queue.amazonaws.com/<account_id>/<name>` host.
    pub fn from_url(raw: &str) -> ResourceResult<Self> {
        let invalid = |reason: &str| {
            ResourceError::InvalidResourceFormat(format!("invalid queue URL {raw}: {reason}"))
        };

        let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(invalid("unsupported scheme"));
        }

        let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
        let region = host
            .strip_suffix(HOST_SUFFIX)
            .and_then(|h| {
                h.strip_prefix("sqs.")
                    .or_else(|| h.strip_suffix(".queue"))
            })
            .filter(|r| !r.is_empty() && !r.contains('.'))
            .ok_or_else(|| invalid("not a queue host"))?;

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        match segments.as_slice() {
            [account_id, name] => Self::from_name(name, region, *account_id),
            _ => Err(invalid("expected /<account_id>/<name>")),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arn(&self) -> String {
        render_arn(Self::PROTOCOL, &self.region, &self.account_id, &self.name)
    }

    pub fn url(&self) -> String {
        format!(
            "https://sqs.{}{HOST_SUFFIX}/{}/{}",
            self.region, self.account_id, self.name
        )
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

    pub fn dest(&self) -> Option<&str> {
        self.standard.as_ref().and_then(|s| s.dest.as_deref())
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

    /// Tags attached when the queue is created. Custom queues carry none.
    pub fn tags(&self) -> Vec<Tag> {
        match &self.standard {
            Some(standard) => Tag::standard_set(standard, self.fifo, true),
            None => Vec::new(),
        }
    }
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGION: &str = "eu-west-1";
    const ACCOUNT: &str = "247606935658";

    #[test]
    fn test_parse_fifo_queue_arn() {
        let queue = Queue::from_arn(
            "arn:aws:sqs:eu-west-1:247606935658:test-event-queue-cyclone_lariat-note_added.fifo",
        )
        .unwrap();
        assert!(queue.is_standard());
        assert_eq!(queue.instance(), Some("test"));
        assert_eq!(queue.kind(), Some(MessageKind::Event));
        assert_eq!(queue.publisher(), Some("cyclone_lariat"));
        assert_eq!(queue.message_type(), Some("note_added"));
        assert_eq!(queue.dest(), None);
        assert!(queue.is_fifo());
        assert_eq!(queue.region(), REGION);
        assert_eq!(queue.account_id(), ACCOUNT);
    }

    #[test]
    fn test_dest_is_part_of_name() {
        let queue = Queue::new(
            "prod",
            MessageKind::Command,
            "billing",
            "charge",
            Some("payments".to_string()),
            false,
            REGION,
            ACCOUNT,
        );
        assert_eq!(queue.name(), "prod-command-queue-billing-charge-payments");
        assert_eq!(Queue::from_name(queue.name(), REGION, ACCOUNT).unwrap(), queue);
    }

    #[test]
    fn test_roundtrip_through_arn_and_url() {
        for dest in [None, Some("notes".to_string())] {
            for fifo in [true, false] {
                let queue = Queue::new(
                    "test",
                    MessageKind::Event,
                    "users",
                    "created",
                    dest.clone(),
                    fifo,
                    REGION,
                    ACCOUNT,
                );
                assert_eq!(queue.name().ends_with(".fifo"), fifo);
                assert_eq!(Queue::from_arn(&queue.arn()).unwrap(), queue);
                assert_eq!(Queue::from_url(&queue.url()).unwrap(), queue);
            }
        }
    }

    #[test]
    fn test_url_format() {
        let queue = Queue::custom("inbox", REGION, ACCOUNT).unwrap();
        assert_eq!(queue.url(), "https://sqs.eu-west-1.amazonaws.com/247606935658/inbox");
    }

    #[test]
    fn test_legacy_url_host() {
        let queue = Queue::from_url("https://us-east-2.queue.amazonaws.com/42/orders.fifo").unwrap();
        assert_eq!(queue.region(), "us-east-2");
        assert_eq!(queue.account_id(), "42");
        assert!(queue.is_fifo());
        assert!(queue.is_custom());
    }

    #[test]
    fn test_invalid_urls() {
        assert!(Queue::from_url("ftp://sqs.eu-west-1.amazonaws.com/1/q").is_err());
        assert!(Queue::from_url("not a url").is_err());
        assert!(Queue::from_url("https://example.com/1/q").is_err());
        assert!(Queue::from_url("https://sqs.eu-west-1.amazonaws.com/q").is_err());
    }

    #[test]
    fn test_short_name_is_custom() {
        let queue = Queue::from_name("test-event-queue", REGION, ACCOUNT).unwrap();
        assert!(queue.is_custom());
        assert_eq!(queue.kind(), None);
        assert_eq!(queue.arn(), "arn:aws:sqs:eu-west-1:247606935658:test-event-queue");
    }

    #[test]
    fn test_tags_default_dest_to_undefined() {
        let queue = Queue::new("t", MessageKind::Event, "p", "x", None, false, REGION, ACCOUNT);
        let tags = queue.tags();
        let dest = tags.iter().find(|t| t.key == "dest").unwrap();
        assert_eq!(dest.value, "undefined");
        assert_eq!(tags.len(), 6);
    }
}
