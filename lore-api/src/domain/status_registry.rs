use std::{collections::HashMap, sync::RwLock};

use tokio::sync::mpsc;
use uuid::Uuid;

use super::resource::ResourceStatusUpdate;

/// Buffer size of per-resource status channels. Writes use `try_send`, so a
/// reader that stopped draining can never block the pipeline.
pub const STATUS_CHANNEL_CAPACITY: usize = 8;

/// Concurrent map of ResourceID → live status channel.
///
/// At most one channel is tracked per resource; registering a new one
/// supersedes the previous entry. The pipeline (or the indexation consumer)
/// is the sole writer per key, the SSE handler the sole reader; ownership is
/// transferred by explicit removal.
#[derive(Default)]
pub struct StatusChannelRegistry {
    channels: RwLock<HashMap<Uuid, mpsc::Sender<ResourceStatusUpdate>>>,
}

impl StatusChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `sender` as the live channel for `resource_id`. Returns true if
    /// a stale entry was superseded.
    pub fn register(&self, resource_id: Uuid, sender: mpsc::Sender<ResourceStatusUpdate>) -> bool {
        self.channels
            .write()
            .expect("status registry lock poisoned")
            .insert(resource_id, sender)
            .is_some()
    }

    pub fn lookup(&self, resource_id: Uuid) -> Option<mpsc::Sender<ResourceStatusUpdate>> {
        self.channels
            .read()
            .expect("status registry lock poisoned")
            .get(&resource_id)
            .cloned()
    }

    pub fn remove(&self, resource_id: Uuid) -> Option<mpsc::Sender<ResourceStatusUpdate>> {
        self.channels
            .write()
            .expect("status registry lock poisoned")
            .remove(&resource_id)
    }

    /// Push an update to the resource's channel, if one is registered.
    ///
    /// Terminal updates remove the entry afterwards; dropping the sender
    /// closes the channel for the reader. A missing or saturated channel is
    /// not an error: the persisted status is the source of truth, only the
    /// live notification is lost.
    pub fn push(&self, update: ResourceStatusUpdate) {
        let sender = self.lookup(update.resource_id);

        if let Some(sender) = sender {
            if let Err(err) = sender.try_send(update) {
                tracing::warn!(
                    resource_id = %update.resource_id,
                    status = %update.status,
                    "dropping status update: {}",
                    err
                );
            }
        }

        if update.status.is_terminal() {
            self.remove(update.resource_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::ResourceStatus;

    fn update(resource_id: Uuid, status: ResourceStatus) -> ResourceStatusUpdate {
        ResourceStatusUpdate {
            resource_id,
            status,
            previous: ResourceStatus::Processing,
        }
    }

    #[tokio::test]
    async fn register_supersedes_previous_channel() {
        let registry = StatusChannelRegistry::new();
        let id = Uuid::new_v4();
        let (tx1, mut rx1) = mpsc::channel(STATUS_CHANNEL_CAPACITY);
        let (tx2, mut rx2) = mpsc::channel(STATUS_CHANNEL_CAPACITY);

        assert!(!registry.register(id, tx1));
        assert!(registry.register(id, tx2));

        registry.push(update(id, ResourceStatus::Processing));
        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.try_recv().unwrap().status, ResourceStatus::Processing);
    }

    #[tokio::test]
    async fn terminal_push_closes_and_removes_the_channel() {
        let registry = StatusChannelRegistry::new();
        let id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(STATUS_CHANNEL_CAPACITY);
        registry.register(id, tx);

        registry.push(update(id, ResourceStatus::Completed));

        assert_eq!(rx.recv().await.unwrap().status, ResourceStatus::Completed);
        // Sender dropped by the registry: the channel is now closed.
        assert!(rx.recv().await.is_none());
        assert!(registry.lookup(id).is_none());
    }

    #[tokio::test]
    async fn push_without_reader_does_not_block() {
        let registry = StatusChannelRegistry::new();
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(STATUS_CHANNEL_CAPACITY);
        registry.register(id, tx);
        drop(rx);

        // Must return immediately even though nobody is listening.
        registry.push(update(id, ResourceStatus::Processing));
        registry.push(update(id, ResourceStatus::Failed));
        assert!(registry.lookup(id).is_none());
    }

    #[test]
    fn push_without_registration_is_a_no_op() {
        let registry = StatusChannelRegistry::new();
        registry.push(update(Uuid::new_v4(), ResourceStatus::Completed));
    }
}
