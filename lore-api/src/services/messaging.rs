//! Message broker boundary: publishing and topic subscription.
//!
//! The traits are the collaborator interface; [`InProcessBus`] is the
//! default single-process deployment. A real broker client implements the
//! same traits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Publish failed: {0}")]
    Publish(String),
    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
    #[error("Handler failed: {0}")]
    Handler(String),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), MessagingError>;
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_message(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        headers: &HashMap<String, String>,
    ) -> Result<(), MessagingError>;
}

#[async_trait]
pub trait MessageConsumer: Send + Sync {
    /// Deliver messages on the given topics to `handler` until the returned
    /// handle is stopped.
    async fn subscribe(
        &self,
        topics: Vec<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<SubscriptionHandle, MessagingError>;
}

pub struct SubscriptionHandle {
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

#[derive(Debug, Clone)]
struct BusMessage {
    topic: String,
    key: String,
    payload: Vec<u8>,
    headers: HashMap<String, String>,
}

/// Broadcast-backed bus connecting in-process publishers and consumers.
#[derive(Clone)]
pub struct InProcessBus {
    tx: broadcast::Sender<BusMessage>,
}

impl InProcessBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventPublisher for InProcessBus {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), MessagingError> {
        let message = BusMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.to_vec(),
            headers: HashMap::new(),
        };

        // No live subscriber still counts as published; the broadcast
        // channel only errors when every receiver is gone.
        if self.tx.send(message).is_err() {
            tracing::debug!(%topic, "published with no subscribers");
        }

        Ok(())
    }
}

#[async_trait]
impl MessageConsumer for InProcessBus {
    async fn subscribe(
        &self,
        topics: Vec<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<SubscriptionHandle, MessagingError> {
        let mut rx = self.tx.subscribe();

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        if !topics.iter().any(|topic| topic == &message.topic) {
                            continue;
                        }
                        if let Err(err) = handler
                            .handle_message(
                                &message.topic,
                                &message.key,
                                &message.payload,
                                &message.headers,
                            )
                            .await
                        {
                            tracing::error!(
                                topic = %message.topic,
                                key = %message.key,
                                "message handler failed: {}",
                                err
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "consumer lagged behind the bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(SubscriptionHandle { task })
    }
}

/// Publisher with a scripted outcome sequence, for retry tests.
#[derive(Default)]
pub struct MockPublisher {
    script: Mutex<Vec<Result<(), String>>>,
    call_count: AtomicUsize,
    published: Mutex<Vec<(String, String)>>,
}

impl MockPublisher {
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// Outcomes are consumed in order; once the script is exhausted every
    /// further publish succeeds.
    pub fn with_script(script: Vec<Result<(), String>>) -> Self {
        Self {
            script: Mutex::new(script),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for MockPublisher {
    async fn publish(&self, topic: &str, key: &str, _payload: &[u8]) -> Result<(), MessagingError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let mut script = self.script.lock().unwrap();
        let outcome = if script.is_empty() {
            Ok(())
        } else {
            script.remove(0)
        };
        drop(script);

        match outcome {
            Ok(()) => {
                self.published
                    .lock()
                    .unwrap()
                    .push((topic.to_string(), key.to_string()));
                Ok(())
            }
            Err(message) => Err(MessagingError::Publish(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct RecordingHandler {
        seen: mpsc::Sender<(String, String)>,
    }

    #[async_trait]
    impl MessageHandler for RecordingHandler {
        async fn handle_message(
            &self,
            topic: &str,
            key: &str,
            _payload: &[u8],
            _headers: &HashMap<String, String>,
        ) -> Result<(), MessagingError> {
            let _ = self.seen.send((topic.to_string(), key.to_string())).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn bus_routes_messages_to_subscribed_topics_only() {
        let bus = InProcessBus::default();
        let (tx, mut rx) = mpsc::channel(8);
        let subscription = bus
            .subscribe(
                vec!["wanted".to_string()],
                Arc::new(RecordingHandler { seen: tx }),
            )
            .await
            .unwrap();

        bus.publish("ignored", "a", b"{}").await.unwrap();
        bus.publish("wanted", "b", b"{}").await.unwrap();

        let (topic, key) = rx.recv().await.unwrap();
        assert_eq!(topic, "wanted");
        assert_eq!(key, "b");
        assert!(rx.try_recv().is_err());

        subscription.stop();
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_not_an_error() {
        let bus = InProcessBus::default();
        assert!(bus.publish("nobody", "k", b"{}").await.is_ok());
    }

    #[tokio::test]
    async fn mock_publisher_follows_its_script() {
        let publisher =
            MockPublisher::with_script(vec![Err("boom".to_string()), Ok(())]);

        assert!(publisher.publish("t", "1", b"").await.is_err());
        assert!(publisher.publish("t", "2", b"").await.is_ok());
        assert!(publisher.publish("t", "3", b"").await.is_ok());
        assert_eq!(publisher.call_count(), 3);
        assert_eq!(publisher.published().len(), 2);
    }
}
