//! Broker client port.

use crate::BrokerResult;
use async_trait::async_trait;
use lariat_messages::Message;
use lariat_resources::{Queue, Resource, Topic};

/// Fanout/queue broker used by the outbox publisher and admin tooling.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Publish the message's wire JSON to `topic`. `fifo` requests ordered
    /// delivery using the message's group and deduplication ids.
    async fn publish(&self, message: &Message, fifo: bool, topic: &Topic) -> BrokerResult<()>;

    /// Create a topic with its tags. Fails if it exists.
    async fn create_topic(&self, topic: &Topic) -> BrokerResult<()>;

    /// Create a queue with its tags. Fails if it exists.
    async fn create_queue(&self, queue: &Queue) -> BrokerResult<()>;

    /// Route messages published to `topic` into `queue`.
    async fn subscribe(&self, topic: &Topic, queue: &Queue) -> BrokerResult<()>;

    async fn unsubscribe(&self, topic: &Topic, queue: &Queue) -> BrokerResult<()>;

    /// Every topic and queue visible to the client.
    async fn list_all(&self) -> BrokerResult<Vec<Resource>>;

    async fn exists(&self, resource: &Resource) -> BrokerResult<bool>;
}
