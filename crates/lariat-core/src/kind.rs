//! Top-level message category.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Message kind: the first segment of every resource name and wire `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Event,
    Command,
}

impl MessageKind {
    pub const ALL: [MessageKind; 2] = [MessageKind::Event, MessageKind::Command];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Command => "command",
        }
    }

    /// Parse a kind tag. Matching is exact: `"Event"` is not a kind.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "event" => Some(Self::Event),
            "command" => Some(Self::Command),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
