//! Polls the outbox table and republishes pending events with bounded retry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::instrument;

use crate::domain::OutboxEvent;
use crate::repositories::{OutboxRepository, RepositoryError};
use crate::services::messaging::{EventPublisher, MessagingError};

#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("Outbox processing cancelled")]
    Cancelled,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Publish(#[from] MessagingError),
}

#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Time between polling ticks.
    pub interval: Duration,
    /// Maximum events loaded per tick.
    pub batch_size: i64,
    /// Total publish attempts per event per batch.
    pub max_retries: u32,
    /// Sleep between attempts.
    pub retry_delay: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            batch_size: 100,
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    pub published: usize,
    pub failed: usize,
}

pub struct OutboxProcessor {
    repo: Arc<dyn OutboxRepository>,
    publisher: Arc<dyn EventPublisher>,
    config: OutboxConfig,
}

impl OutboxProcessor {
    pub fn new(
        repo: Arc<dyn OutboxRepository>,
        publisher: Arc<dyn EventPublisher>,
        config: OutboxConfig,
    ) -> Self {
        Self {
            repo,
            publisher,
            config,
        }
    }

    /// Run until the shutdown signal fires. Intended to be spawned as a
    /// background task; blocks its caller.
    #[instrument(name = "OutboxProcessor::run", skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        // The first tick fires immediately; skip it so the app finishes
        // starting before the first poll.
        ticker.tick().await;

        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            "outbox processor started"
        );

        loop {
            // The batch gets its own receiver so the retry sleeps can watch
            // for shutdown while this loop's `changed` future holds ours.
            let mut batch_shutdown = shutdown.clone();
            tokio::select! {
                _ = ticker.tick() => {
                    match self.process_batch(&mut batch_shutdown).await {
                        Ok(stats) if stats.published > 0 || stats.failed > 0 => {
                            tracing::info!(
                                published = stats.published,
                                failed = stats.failed,
                                "outbox batch processed"
                            );
                        }
                        Ok(_) => {}
                        Err(OutboxError::Cancelled) => break,
                        Err(err) => tracing::error!("outbox batch failed: {}", err),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("outbox processor stopped");
    }

    /// Process one batch synchronously, outside the ticker. Operational and
    /// test entry point.
    pub async fn process_now(&self) -> Result<BatchStats, OutboxError> {
        // Keep the sender alive for the duration of the call so the
        // cancellation branch never fires spuriously.
        let (_tx, mut rx) = watch::channel(false);
        self.process_batch(&mut rx).await
    }

    async fn process_batch(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<BatchStats, OutboxError> {
        let events = self.repo.unsent(self.config.batch_size).await?;

        let mut stats = BatchStats::default();
        for event in &events {
            match self.process_event_with_retry(event, shutdown).await {
                Ok(()) => stats.published += 1,
                Err(OutboxError::Cancelled) => return Err(OutboxError::Cancelled),
                Err(err) => {
                    // A poisoned event must not block the rest of the batch;
                    // it stays unsent and is retried on the next tick.
                    tracing::error!(
                        event_id = %event.id,
                        event_name = %event.name,
                        "giving up on event for this batch: {}",
                        err
                    );
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }

    async fn process_event_with_retry(
        &self,
        event: &OutboxEvent,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), OutboxError> {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = OutboxError::Cancelled;

        for attempt in 1..=attempts {
            match self.process_event(event).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::warn!(
                        event_id = %event.id,
                        attempt,
                        max_attempts = attempts,
                        "publish attempt failed: {}",
                        err
                    );
                    last_error = err;
                }
            }

            if attempt < attempts {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.retry_delay) => {}
                    _ = shutdown.changed() => return Err(OutboxError::Cancelled),
                }
            }
        }

        Err(last_error)
    }

    async fn process_event(&self, event: &OutboxEvent) -> Result<(), OutboxError> {
        let payload = serde_json::to_vec(&event.envelope()).map_err(MessagingError::from)?;

        self.publisher
            .publish(&event.topic, &event.id.to_string(), &payload)
            .await?;

        // The sent flag flips only after a confirmed publish. If this write
        // fails the event is republished later; delivery is at-least-once.
        self.repo.mark_sent(event.id).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewOutboxEvent;
    use crate::repositories::{InMemoryOutboxRepository, InMemoryStore};
    use crate::services::messaging::MockPublisher;

    fn test_config() -> OutboxConfig {
        OutboxConfig {
            interval: Duration::from_millis(10),
            batch_size: 100,
            max_retries: 3,
            retry_delay: Duration::from_millis(5),
        }
    }

    fn seed_event(store: &InMemoryStore) -> uuid::Uuid {
        store.append_event(NewOutboxEvent {
            topic: "resource_events".to_string(),
            name: "resource.created".to_string(),
            payload: serde_json::json!({ "resourceId": uuid::Uuid::new_v4() }),
        })
    }

    fn processor(
        store: &InMemoryStore,
        publisher: Arc<MockPublisher>,
        config: OutboxConfig,
    ) -> OutboxProcessor {
        OutboxProcessor::new(
            Arc::new(InMemoryOutboxRepository::new(store.clone())),
            publisher,
            config,
        )
    }

    #[tokio::test]
    async fn retry_succeeds_on_third_attempt() {
        let store = InMemoryStore::new();
        seed_event(&store);
        let publisher = Arc::new(MockPublisher::with_script(vec![
            Err("down".to_string()),
            Err("still down".to_string()),
            Ok(()),
        ]));

        let stats = processor(&store, publisher.clone(), test_config())
            .process_now()
            .await
            .unwrap();

        assert_eq!(stats, BatchStats { published: 1, failed: 0 });
        assert_eq!(publisher.call_count(), 3);
        assert!(store.events()[0].sent);
    }

    #[tokio::test]
    async fn retry_exhaustion_performs_exactly_max_retries_calls() {
        let store = InMemoryStore::new();
        seed_event(&store);
        let publisher = Arc::new(MockPublisher::with_script(vec![
            Err("1".to_string()),
            Err("2".to_string()),
            Err("3".to_string()),
        ]));

        let stats = processor(&store, publisher.clone(), test_config())
            .process_now()
            .await
            .unwrap();

        assert_eq!(stats, BatchStats { published: 0, failed: 1 });
        assert_eq!(publisher.call_count(), 3);
        assert!(!store.events()[0].sent);
    }

    #[tokio::test]
    async fn poisoned_event_does_not_block_the_batch() {
        let store = InMemoryStore::new();
        seed_event(&store);
        seed_event(&store);
        let publisher = Arc::new(MockPublisher::with_script(vec![
            Err("poison".to_string()),
            Ok(()),
        ]));
        let config = OutboxConfig {
            max_retries: 1,
            ..test_config()
        };

        let stats = processor(&store, publisher.clone(), config)
            .process_now()
            .await
            .unwrap();

        assert_eq!(stats, BatchStats { published: 1, failed: 1 });
        let events = store.events();
        assert!(!events[0].sent);
        assert!(events[1].sent);
    }

    #[tokio::test]
    async fn unsent_events_stay_eligible_until_published() {
        let store = InMemoryStore::new();
        seed_event(&store);
        let publisher = Arc::new(MockPublisher::with_script(vec![
            Err("a".to_string()),
            Err("b".to_string()),
        ]));
        let config = OutboxConfig {
            max_retries: 1,
            ..test_config()
        };
        let processor = processor(&store, publisher.clone(), config);

        processor.process_now().await.unwrap();
        processor.process_now().await.unwrap();
        assert!(!store.events()[0].sent);

        // Script exhausted: the next poll publishes.
        let stats = processor.process_now().await.unwrap();
        assert_eq!(stats.published, 1);
        assert!(store.events()[0].sent);

        // Nothing left to do.
        let stats = processor.process_now().await.unwrap();
        assert_eq!(stats, BatchStats::default());
        assert_eq!(publisher.call_count(), 3);
    }

    #[tokio::test]
    async fn empty_outbox_is_a_quiet_no_op() {
        let store = InMemoryStore::new();
        let publisher = Arc::new(MockPublisher::succeeding());

        let stats = processor(&store, publisher.clone(), test_config())
            .process_now()
            .await
            .unwrap();

        assert_eq!(stats, BatchStats::default());
        assert_eq!(publisher.call_count(), 0);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let store = InMemoryStore::new();
        let publisher = Arc::new(MockPublisher::succeeding());
        let processor = Arc::new(processor(&store, publisher, test_config()));

        let (tx, rx) = watch::channel(false);
        let task = {
            let processor = processor.clone();
            tokio::spawn(async move { processor.run(rx).await })
        };

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("processor did not stop")
            .unwrap();
    }
}
