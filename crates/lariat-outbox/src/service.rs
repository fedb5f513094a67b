//! Outbox publisher and resend service.

use crate::{Outbox, OutboxError, OutboxRepository, OutboxResult};
use lariat_broker::{BrokerClient, BrokerError};
use lariat_core::Config;
use lariat_database::{rusqlite::Transaction, DatabaseError, SqliteStore};
use lariat_messages::Message;
use lariat_resources::Topic;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Called for every message the broker refuses during a publish pass.
pub type SendingErrorCallback = Arc<dyn Fn(&Message, &BrokerError) + Send + Sync>;

/// Outcome of one publish pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Confirmed by the broker and removed from the outbox.
    pub published: Vec<Uuid>,
    /// Left in the outbox with their sending error recorded.
    pub failed: Vec<Uuid>,
}

impl PublishReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Error from a SQLite transaction: the caller's own, or the outbox's.
enum TransactionFailure<E> {
    Caller(E),
    Outbox(OutboxError),
}

impl<E> From<DatabaseError> for TransactionFailure<E> {
    fn from(e: DatabaseError) -> Self {
        Self::Outbox(e.into())
    }
}

/// Publishes outbox messages to the broker and retries the ones left behind.
pub struct OutboxService {
    config: Config,
    repository: OutboxRepository,
    broker: Arc<dyn BrokerClient>,
    on_sending_error: Option<SendingErrorCallback>,
}

impl OutboxService {
    pub fn new(config: Config, repository: OutboxRepository, broker: Arc<dyn BrokerClient>) -> Self {
        Self {
            config,
            repository,
            broker,
            on_sending_error: None,
        }
    }

    pub fn with_sending_error_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Message, &BrokerError) + Send + Sync + 'static,
    {
        self.on_sending_error = Some(Arc::new(callback));
        self
    }

    pub fn repository(&self) -> &OutboxRepository {
        &self.repository
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Topic a message is published to.
    pub fn destination(&self, message: &Message) -> Topic {
        Topic::new(
            &self.config.instance,
            message.kind(),
            message.publisher_name(),
            message.message_type(),
            message.fifo(),
            &self.config.aws_region,
            &self.config.aws_account_id,
        )
    }

    /// Run a unit of work that buffers messages, then store and publish them.
    ///
    /// Nothing is stored or published if `f` fails or a buffered message is
    /// invalid. With a disabled repository the messages are published directly.
    pub async fn transaction<T, E, F>(&self, f: F) -> Result<(T, PublishReport), E>
    where
        F: FnOnce(&mut Outbox) -> Result<T, E>,
        E: From<OutboxError>,
    {
        let mut outbox = Outbox::new();
        let value = f(&mut outbox)?;
        outbox.validate().map_err(OutboxError::from)?;
        self.repository.create_all(outbox.messages())?;
        let report = self.publish(outbox).await?;
        Ok((value, report))
    }

    /// Run `f` in a SQLite transaction alongside the outbox rows it buffers.
    ///
    /// The transaction runs on the repository's own store, so the rows it
    /// commits are the ones later deleted or resent. Domain writes made
    /// through the transaction and the outbox rows commit together. If `f`
    /// fails, or a buffered message is invalid, the transaction rolls back and
    /// nothing is published. Fails with [`OutboxError::SqliteRequired`] when
    /// the repository is not backed by SQLite.
    pub async fn sqlite_transaction<T, E, F>(&self, f: F) -> Result<(T, PublishReport), E>
    where
        F: FnOnce(&Transaction<'_>, &mut Outbox) -> Result<T, E>,
        E: From<OutboxError>,
    {
        let store = self
            .repository
            .sqlite_store()
            .ok_or(OutboxError::SqliteRequired)?;
        let mut outbox = Outbox::new();
        let committed: Result<T, TransactionFailure<E>> = store.with_transaction(|tx| {
            let value = f(tx, &mut outbox).map_err(TransactionFailure::Caller)?;
            let records = outbox
                .messages()
                .iter()
                .map(OutboxRepository::record_for)
                .collect::<OutboxResult<Vec<_>>>()
                .map_err(TransactionFailure::Outbox)?;
            SqliteStore::insert_outbox_on(tx, &records)?;
            Ok(value)
        });

        let value = match committed {
            Ok(value) => value,
            Err(TransactionFailure::Caller(e)) => return Err(e),
            Err(TransactionFailure::Outbox(e)) => return Err(e.into()),
        };
        debug!(count = outbox.len(), "Committed outbox rows");
        let report = self.publish(outbox).await?;
        Ok((value, report))
    }

    /// Publish pass over messages already committed to the outbox.
    pub async fn publish(&self, outbox: Outbox) -> OutboxResult<PublishReport> {
        if outbox.is_empty() {
            return Ok(PublishReport::default());
        }
        self.publish_pass(outbox.into_messages(), PublishReport::default())
            .await
    }

    /// Publish pass over rows older than the configured resend timeout.
    ///
    /// Rows that no longer rebuild into a valid message get the error recorded
    /// and stay in the outbox.
    pub async fn resend(&self) -> OutboxResult<PublishReport> {
        let due = self.repository.each_for_resend(self.config.resend_timeout())?;
        let mut report = PublishReport::default();
        let mut messages = Vec::with_capacity(due.len());

        for (uuid, rebuilt) in due {
            match rebuilt.and_then(|message| message.validate().map(|_| message)) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    warn!(uuid = %uuid, error = %e, "Outbox row cannot be resent");
                    self.record_error(uuid, &e.to_string());
                    report.failed.push(uuid);
                }
            }
        }

        if messages.is_empty() {
            return Ok(report);
        }
        self.publish_pass(messages, report).await
    }

    /// Attempt every message in order. Failures are recorded and skipped;
    /// successes are deleted in one batch at the end.
    async fn publish_pass(
        &self,
        messages: Vec<Message>,
        mut report: PublishReport,
    ) -> OutboxResult<PublishReport> {
        for message in &messages {
            let Some(uuid) = message.id() else {
                warn!(uuid = message.uuid(), "Skipping message without a valid uuid");
                continue;
            };
            let topic = self.destination(message);

            match self.broker.publish(message, message.fifo(), &topic).await {
                Ok(()) => {
                    debug!(uuid = %uuid, topic = %topic, "Message published");
                    report.published.push(uuid);
                }
                Err(e) => {
                    warn!(uuid = %uuid, topic = %topic, error = %e, "Message publish failed");
                    self.record_error(uuid, &e.to_string());
                    if let Some(callback) = &self.on_sending_error {
                        callback(message, &e);
                    }
                    report.failed.push(uuid);
                }
            }
        }

        self.repository.delete(&report.published)?;
        info!(
            published = report.published.len(),
            failed = report.failed.len(),
            "Publish pass complete"
        );
        Ok(report)
    }

    fn record_error(&self, uuid: Uuid, message: &str) {
        if let Err(e) = self.repository.update_error(uuid, message) {
            error!(uuid = %uuid, error = %e, "Failed to record sending error");
        }
    }
}
