use std::{collections::HashMap, sync::RwLock};

use tokio::sync::oneshot;
use uuid::Uuid;

/// In-memory registry of in-flight streaming asks, keyed by process id.
///
/// Each entry holds the cancel handle for one request; the SSE loop listens
/// on the paired receiver and terminates on the next poll after `cancel`.
/// Entries live only for the duration of the request and are removed on
/// completion, error, cancellation, or client disconnect.
#[derive(Default)]
pub struct ProcessRegistry {
    processes: RwLock<HashMap<Uuid, oneshot::Sender<()>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh process id and its cancellation receiver.
    pub fn register(&self) -> (Uuid, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let process_id = Uuid::new_v4();
        self.processes
            .write()
            .expect("process registry lock poisoned")
            .insert(process_id, tx);
        (process_id, rx)
    }

    /// Cancel the process with the given id. Returns false for unknown ids
    /// so the caller can report not-found instead of silently ignoring it.
    pub fn cancel(&self, process_id: Uuid) -> bool {
        let entry = self
            .processes
            .write()
            .expect("process registry lock poisoned")
            .remove(&process_id);

        match entry {
            Some(tx) => {
                // A dropped receiver means the stream already ended; the
                // entry existed, so the cancel is still acknowledged.
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, process_id: Uuid) {
        self.processes
            .write()
            .expect("process registry lock poisoned")
            .remove(&process_id);
    }

    pub fn contains(&self, process_id: Uuid) -> bool {
        self.processes
            .read()
            .expect("process registry lock poisoned")
            .contains_key(&process_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_fires_the_receiver() {
        let registry = ProcessRegistry::new();
        let (id, rx) = registry.register();

        assert!(registry.contains(id));
        assert!(registry.cancel(id));
        assert!(rx.await.is_ok());
        assert!(!registry.contains(id));
    }

    #[test]
    fn cancel_unknown_id_reports_not_found() {
        let registry = ProcessRegistry::new();
        assert!(!registry.cancel(Uuid::new_v4()));
    }

    #[test]
    fn remove_releases_the_entry() {
        let registry = ProcessRegistry::new();
        let (id, _rx) = registry.register();
        registry.remove(id);
        assert!(!registry.contains(id));
        assert!(!registry.cancel(id));
    }
}
