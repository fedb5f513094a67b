//! In-process broker.

use crate::{BrokerClient, BrokerError, BrokerResult};
use async_trait::async_trait;
use lariat_messages::Message;
use lariat_resources::{Queue, Resource, Topic};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A message accepted by [`InMemoryBroker::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic_arn: String,
    pub body: String,
    pub group_id: Option<String>,
    pub deduplication_id: Option<String>,
}

/// Fanout notification as delivered to a subscribed queue.
#[derive(Serialize)]
struct Notification<'a> {
    #[serde(rename = "Type")]
    kind: &'static str,
    #[serde(rename = "MessageId")]
    message_id: String,
    #[serde(rename = "TopicArn")]
    topic_arn: &'a str,
    #[serde(rename = "Message")]
    message: &'a str,
}

#[derive(Default)]
struct BrokerState {
    topics: BTreeMap<String, Topic>,
    queues: BTreeMap<String, Queue>,
    /// `(topic_arn, queue_arn)`
    subscriptions: BTreeSet<(String, String)>,
    deliveries: HashMap<String, VecDeque<String>>,
    published: Vec<PublishedMessage>,
    failing: HashSet<String>,
}

/// Broker that keeps topics, queues, and deliveries in memory.
#[derive(Default)]
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
    auto_create: bool,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create topics on first publish instead of failing.
    pub fn with_auto_create(mut self) -> Self {
        self.auto_create = true;
        self
    }

    fn state(&self) -> BrokerResult<MutexGuard<'_, BrokerState>> {
        self.state
            .lock()
            .map_err(|_| BrokerError::Unavailable("broker state mutex poisoned".to_string()))
    }

    /// Reject publishes of the message with this uuid until [`Self::recover`].
    pub fn fail_for(&self, uuid: &str) {
        if let Ok(mut state) = self.state() {
            state.failing.insert(uuid.to_string());
        }
    }

    pub fn recover(&self, uuid: &str) {
        if let Ok(mut state) = self.state() {
            state.failing.remove(uuid);
        }
    }

    /// Everything published so far, in order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state()
            .map(|state| state.published.clone())
            .unwrap_or_default()
    }

    /// Drain the notifications delivered to `queue`.
    pub fn receive(&self, queue: &Queue) -> Vec<String> {
        self.state()
            .ok()
            .and_then(|mut state| state.deliveries.remove(&queue.arn()))
            .map(Vec::from)
            .unwrap_or_default()
    }
}

#[async_trait]
impl BrokerClient for InMemoryBroker {
    async fn publish(&self, message: &Message, fifo: bool, topic: &Topic) -> BrokerResult<()> {
        let body = message.to_json()?;
        let topic_arn = topic.arn();
        let mut state = self.state()?;

        if state.failing.contains(message.uuid()) {
            warn!(uuid = message.uuid(), topic = %topic, "Injected publish failure");
            return Err(BrokerError::Publish(format!(
                "broker rejected message {}",
                message.uuid()
            )));
        }
        if fifo && !topic.is_fifo() {
            return Err(BrokerError::Publish(format!(
                "ordered publish to non-FIFO topic {topic}"
            )));
        }
        if !state.topics.contains_key(&topic_arn) {
            if !self.auto_create {
                return Err(BrokerError::ResourceDoesNotExist(topic_arn));
            }
            info!(topic = %topic, "Auto-creating topic");
            state.topics.insert(topic_arn.clone(), topic.clone());
        }

        let notification = serde_json::to_string(&Notification {
            kind: "Notification",
            message_id: Uuid::new_v4().to_string(),
            topic_arn: &topic_arn,
            message: &body,
        })
        .map_err(|e| BrokerError::Publish(e.to_string()))?;

        let queues: Vec<String> = state
            .subscriptions
            .iter()
            .filter(|(t, _)| *t == topic_arn)
            .map(|(_, q)| q.clone())
            .collect();
        for queue_arn in &queues {
            state
                .deliveries
                .entry(queue_arn.clone())
                .or_default()
                .push_back(notification.clone());
        }

        debug!(
            uuid = message.uuid(),
            topic = %topic,
            fifo,
            deliveries = queues.len(),
            "Published message"
        );
        state.published.push(PublishedMessage {
            topic_arn,
            body,
            group_id: fifo.then(|| message.group_id().map(str::to_string)).flatten(),
            deduplication_id: fifo
                .then(|| message.deduplication_id().map(str::to_string))
                .flatten(),
        });
        Ok(())
    }

    async fn create_topic(&self, topic: &Topic) -> BrokerResult<()> {
        let arn = topic.arn();
        let mut state = self.state()?;
        if state.topics.contains_key(&arn) {
            return Err(BrokerError::ResourceAlreadyExists(arn));
        }
        info!(topic = %topic, tags = ?topic.tags(), "Created topic");
        state.topics.insert(arn, topic.clone());
        Ok(())
    }

    async fn create_queue(&self, queue: &Queue) -> BrokerResult<()> {
        let arn = queue.arn();
        let mut state = self.state()?;
        if state.queues.contains_key(&arn) {
            return Err(BrokerError::ResourceAlreadyExists(arn));
        }
        info!(queue = %queue, tags = ?queue.tags(), "Created queue");
        state.queues.insert(arn, queue.clone());
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic, queue: &Queue) -> BrokerResult<()> {
        let (topic_arn, queue_arn) = (topic.arn(), queue.arn());
        let mut state = self.state()?;
        if !state.topics.contains_key(&topic_arn) {
            return Err(BrokerError::ResourceDoesNotExist(topic_arn));
        }
        if !state.queues.contains_key(&queue_arn) {
            return Err(BrokerError::ResourceDoesNotExist(queue_arn));
        }
        info!(topic = %topic, queue = %queue, "Subscribed");
        state.subscriptions.insert((topic_arn, queue_arn));
        Ok(())
    }

    async fn unsubscribe(&self, topic: &Topic, queue: &Queue) -> BrokerResult<()> {
        let key = (topic.arn(), queue.arn());
        let mut state = self.state()?;
        if !state.subscriptions.remove(&key) {
            return Err(BrokerError::ResourceDoesNotExist(format!(
                "subscription {} -> {}",
                key.0, key.1
            )));
        }
        info!(topic = %topic, queue = %queue, "Unsubscribed");
        Ok(())
    }

    async fn list_all(&self) -> BrokerResult<Vec<Resource>> {
        let state = self.state()?;
        let topics = state.topics.values().cloned().map(Resource::Topic);
        let queues = state.queues.values().cloned().map(Resource::Queue);
        Ok(topics.chain(queues).collect())
    }

    async fn exists(&self, resource: &Resource) -> BrokerResult<bool> {
        let state = self.state()?;
        Ok(match resource {
            Resource::Topic(topic) => state.topics.contains_key(&topic.arn()),
            Resource::Queue(queue) => state.queues.contains_key(&queue.arn()),
        })
    }
}
