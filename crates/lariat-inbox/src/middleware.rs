//! Deduplicating receive path.

use crate::{HandlerError, InboxError, InboxRepository, InboxResult, MessageHandler};
use lariat_database::DatabaseError;
use lariat_messages::{build, ClientError, Message, Timestamp};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to a delivered body.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Handled and marked processed.
    Processed,
    /// Already processed earlier; the handler was not invoked.
    Duplicate,
    /// Handled with a business-rule failure, recorded on the message.
    ClientError(ClientError),
    /// Not a valid message. Handed to [`MessageHandler::handle_raw`] untouched.
    PassedThrough,
}

/// Failures reported to the notifier. Delivery itself carries on.
#[derive(Debug, Clone, PartialEq)]
pub enum InboxNotice {
    Malformed { body: String, error: String },
    HandlerFailed { uuid: String, error: String },
}

impl fmt::Display for InboxNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { error, .. } => write!(f, "malformed message: {error}"),
            Self::HandlerFailed { uuid, error } => write!(f, "handler failed for {uuid}: {error}"),
        }
    }
}

pub type Notifier = Arc<dyn Fn(&InboxNotice) + Send + Sync>;

/// Wraps a [`MessageHandler`] so each message uuid is handled at most once.
///
/// The message is stored before the handler runs and marked processed after
/// it returns, successfully or with a client error. A fatal handler error
/// leaves the row unprocessed and is returned so the broker redelivers.
#[derive(Clone)]
pub struct InboxMiddleware {
    repository: InboxRepository,
    notifier: Option<Notifier>,
}

impl InboxMiddleware {
    pub fn new(repository: InboxRepository) -> Self {
        Self {
            repository,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: impl Fn(&InboxNotice) + Send + Sync + 'static) -> Self {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    pub fn repository(&self) -> &InboxRepository {
        &self.repository
    }

    /// Process one delivered body.
    ///
    /// Accepts a bare message or a fanout notification whose `Message` field
    /// holds the message JSON.
    pub async fn call(&self, body: &str, handler: &dyn MessageHandler) -> InboxResult<Outcome> {
        let mut message = match parse(body) {
            Ok(message) => message,
            Err(error) => {
                warn!(error = %error, "Received body is not a valid message");
                self.notify(InboxNotice::Malformed {
                    body: body.to_string(),
                    error: error.to_string(),
                });
                handler.handle_raw(body).await.map_err(InboxError::Handler)?;
                return Ok(Outcome::PassedThrough);
            }
        };
        let uuid = message
            .id()
            .ok_or_else(|| InboxError::InvalidId(message.uuid().to_string()))?;
        message.set_received_at(Timestamp::now());

        if !self.repository.is_disabled() {
            match self.repository.find(uuid)? {
                Some(stored) if stored.is_processed() => {
                    info!(uuid = %uuid, message_type = message.message_type(), "Skipping processed message");
                    return Ok(Outcome::Duplicate);
                }
                Some(stored) => {
                    debug!(uuid = %uuid, "Retrying unprocessed message");
                    if let Some(received_at) = stored.received_at() {
                        message.set_received_at(received_at.clone());
                    }
                }
                None => {
                    match self.repository.create(&message) {
                        Ok(_) => {}
                        Err(InboxError::Database(DatabaseError::DuplicateKey(_))) => {
                            info!(uuid = %uuid, "Message is being handled by another delivery");
                            return Ok(Outcome::Duplicate);
                        }
                        Err(error) => return Err(error),
                    }
                }
            }
        }

        let handled = handler.handle(&message).await;
        match handled {
            Ok(()) => {
                self.repository.mark_processed(uuid, None)?;
                debug!(uuid = %uuid, message_type = message.message_type(), "Message processed");
                Ok(Outcome::Processed)
            }
            Err(HandlerError::Client(error)) => {
                message.set_client_error(Some(error.clone()));
                self.repository.mark_processed(uuid, message.client_error())?;
                info!(uuid = %uuid, error = %error, "Message processed with client error");
                Ok(Outcome::ClientError(error))
            }
            Err(error @ HandlerError::Fatal(_)) => {
                warn!(uuid = %uuid, error = %error, "Handler failed, message left for redelivery");
                self.notify(InboxNotice::HandlerFailed {
                    uuid: uuid.to_string(),
                    error: error.to_string(),
                });
                Err(InboxError::Handler(error))
            }
        }
    }

    fn notify(&self, notice: InboxNotice) {
        if let Some(notifier) = &self.notifier {
            notifier(&notice);
        }
    }
}

/// Build and validate a message from a delivered body.
fn parse(body: &str) -> InboxResult<Message> {
    let mut value: Value = serde_json::from_str(body)?;
    if value.get("Type").and_then(Value::as_str) == Some("Notification") {
        if let Some(inner) = value.get("Message").and_then(Value::as_str) {
            value = serde_json::from_str(inner)?;
        }
    }
    let message = build(&value)?;
    message.validate()?;
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lariat_core::Config;
    use lariat_database::{MemoryStore, SqliteStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: AtomicUsize,
        raw: Mutex<Vec<String>>,
        fail_with: Mutex<Option<HandlerError>>,
    }

    impl Recorder {
        fn failing(error: HandlerError) -> Self {
            Self {
                fail_with: Mutex::new(Some(error)),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle(&self, message: &Message) -> Result<(), HandlerError> {
            assert!(message.received_at().is_some());
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail_with.lock().unwrap().clone() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }

        async fn handle_raw(&self, body: &str) -> Result<(), HandlerError> {
            self.raw.lock().unwrap().push(body.to_string());
            Ok(())
        }
    }

    fn middlewares() -> Vec<(&'static str, InboxMiddleware)> {
        vec![
            (
                "sqlite",
                InboxMiddleware::new(InboxRepository::new(Arc::new(
                    SqliteStore::open_in_memory().unwrap(),
                ))),
            ),
            (
                "memory",
                InboxMiddleware::new(InboxRepository::new(Arc::new(MemoryStore::new()))),
            ),
        ]
    }

    fn body() -> (Message, String) {
        let message = Message::event(&Config::new("test", "sample_app"), "note_added", json!({ "id": 1 }));
        let body = message.to_json().unwrap();
        (message, body)
    }

    #[tokio::test]
    async fn test_second_delivery_is_skipped() {
        for (driver, middleware) in middlewares() {
            let handler = Recorder::default();
            let (message, body) = body();

            assert_eq!(middleware.call(&body, &handler).await.unwrap(), Outcome::Processed);
            assert_eq!(middleware.call(&body, &handler).await.unwrap(), Outcome::Duplicate);
            assert_eq!(handler.calls(), 1, "{driver}");

            let stored = middleware.repository().find(message.id().unwrap()).unwrap().unwrap();
            assert!(stored.is_processed(), "{driver}");
            assert!(stored.client_error().is_none(), "{driver}");
        }
    }

    #[tokio::test]
    async fn test_client_error_is_recorded_and_not_retried() {
        for (driver, middleware) in middlewares() {
            let error = ClientError::new("insufficient funds").with_details(json!({ "balance": 3 }));
            let handler = Recorder::failing(HandlerError::Client(error.clone()));
            let (message, body) = body();

            let outcome = middleware.call(&body, &handler).await.unwrap();
            assert_eq!(outcome, Outcome::ClientError(error.clone()));
            assert_eq!(middleware.call(&body, &handler).await.unwrap(), Outcome::Duplicate);
            assert_eq!(handler.calls(), 1, "{driver}");

            let stored = middleware.repository().find(message.id().unwrap()).unwrap().unwrap();
            assert_eq!(stored.client_error(), Some(&error), "{driver}");
        }
    }

    #[tokio::test]
    async fn test_fatal_error_leaves_message_for_redelivery() {
        for (driver, middleware) in middlewares() {
            let notices = Arc::new(Mutex::new(Vec::new()));
            let sink = notices.clone();
            let middleware = middleware.with_notifier(move |n: &InboxNotice| {
                sink.lock().unwrap().push(n.clone());
            });
            let handler = Recorder::failing(HandlerError::fatal("database is down"));
            let (message, body) = body();

            let err = middleware.call(&body, &handler).await.unwrap_err();
            assert!(matches!(err, InboxError::Handler(HandlerError::Fatal(_))), "{driver}");
            assert_eq!(middleware.repository().each_unprocessed().unwrap().len(), 1, "{driver}");
            assert_eq!(
                notices.lock().unwrap().as_slice(),
                [InboxNotice::HandlerFailed {
                    uuid: message.uuid().to_string(),
                    error: "database is down".into(),
                }]
            );

            *handler.fail_with.lock().unwrap() = None;
            assert_eq!(middleware.call(&body, &handler).await.unwrap(), Outcome::Processed);
            assert_eq!(handler.calls(), 2, "{driver}");
            assert!(middleware.repository().each_unprocessed().unwrap().is_empty(), "{driver}");
        }
    }

    #[tokio::test]
    async fn test_notification_wrapper_is_unwrapped() {
        for (_, middleware) in middlewares() {
            let handler = Recorder::default();
            let (message, inner) = body();
            let wrapped = json!({
                "Type": "Notification",
                "MessageId": "b1946ac9",
                "TopicArn": "arn:aws:sns:eu-west-1:1:test-event-fanout-sample_app-note_added",
                "Message": inner,
            })
            .to_string();

            assert_eq!(middleware.call(&wrapped, &handler).await.unwrap(), Outcome::Processed);
            assert!(middleware.repository().exists(message.id().unwrap()).unwrap());
        }
    }

    #[tokio::test]
    async fn test_invalid_bodies_pass_through() {
        for (_, middleware) in middlewares() {
            let notices = Arc::new(AtomicUsize::new(0));
            let count = notices.clone();
            let middleware = middleware.with_notifier(move |_: &InboxNotice| {
                count.fetch_add(1, Ordering::SeqCst);
            });
            let handler = Recorder::default();

            let invalid = json!({ "uuid": "x", "type": "event_a", "version": 1 }).to_string();
            for body in ["not json", "[1, 2]", invalid.as_str()] {
                assert_eq!(middleware.call(body, &handler).await.unwrap(), Outcome::PassedThrough);
            }
            assert_eq!(handler.calls(), 0);
            assert_eq!(handler.raw.lock().unwrap().len(), 3);
            assert_eq!(notices.load(Ordering::SeqCst), 3);
        }
    }

    #[tokio::test]
    async fn test_disabled_repository_handles_every_delivery() {
        let middleware = InboxMiddleware::new(InboxRepository::disabled());
        let handler = Recorder::default();
        let (_, body) = body();

        assert_eq!(middleware.call(&body, &handler).await.unwrap(), Outcome::Processed);
        assert_eq!(middleware.call(&body, &handler).await.unwrap(), Outcome::Processed);
        assert_eq!(handler.calls(), 2);
    }
}
