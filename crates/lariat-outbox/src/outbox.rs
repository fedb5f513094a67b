//! In-flight message buffer.

use lariat_messages::{Message, MessageResult};

/// Messages collected during one unit of work.
///
/// An `Outbox` belongs to a single transaction scope. Its contents are
/// persisted when the scope commits and discarded when it does not.
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<Message>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Validate every buffered message, failing on the first invalid one.
    pub fn validate(&self) -> MessageResult<()> {
        self.messages.iter().try_for_each(Message::validate)
    }
}

impl Extend<Message> for Outbox {
    fn extend<I: IntoIterator<Item = Message>>(&mut self, iter: I) {
        self.messages.extend(iter);
    }
}
