//! In-memory repositories for tests.
//!
//! The resource and outbox repositories share one store handle so a test can
//! observe the events written by resource mutations, mirroring the shared
//! database of the real implementations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{NewOutboxEvent, OutboxEvent, Resource, ResourceStatus};

use super::outbox_repo::OutboxRepository;
use super::repo_error::RepositoryError;
use super::resource_repo::ResourceRepository;

#[derive(Default)]
struct StoreInner {
    resources: HashMap<Uuid, Resource>,
    events: Vec<OutboxEvent>,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OutboxEvent> {
        self.inner.lock().unwrap().events.clone()
    }

    pub fn resource(&self, id: Uuid) -> Option<Resource> {
        self.inner.lock().unwrap().resources.get(&id).cloned()
    }

    pub fn resource_count(&self) -> usize {
        self.inner.lock().unwrap().resources.len()
    }

    /// Seed an event directly, bypassing any entity mutation.
    pub fn append_event(&self, event: NewOutboxEvent) -> Uuid {
        let mut inner = self.inner.lock().unwrap();
        push_event(&mut inner, event)
    }
}

fn push_event(inner: &mut StoreInner, event: NewOutboxEvent) -> Uuid {
    let id = Uuid::new_v4();
    inner.events.push(OutboxEvent {
        id,
        topic: event.topic,
        name: event.name,
        payload: event.payload,
        sent: false,
        event_time: OffsetDateTime::now_utc(),
    });
    id
}

pub struct InMemoryResourceRepository {
    store: InMemoryStore,
}

impl InMemoryResourceRepository {
    pub fn new(store: InMemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ResourceRepository for InMemoryResourceRepository {
    async fn create(
        &self,
        resource: &Resource,
        event: NewOutboxEvent,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.store.inner.lock().unwrap();
        inner.resources.insert(resource.id, resource.clone());
        push_event(&mut inner, event);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Resource, RepositoryError> {
        self.store
            .inner
            .lock()
            .unwrap()
            .resources
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("resource {}", id)))
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Resource>, RepositoryError> {
        let inner = self.store.inner.lock().unwrap();
        let mut resources: Vec<Resource> = inner
            .resources
            .values()
            .filter(|resource| resource.owner_id == owner_id)
            .cloned()
            .collect();
        resources.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(resources)
    }

    async fn update(
        &self,
        resource: &Resource,
        event: NewOutboxEvent,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.store.inner.lock().unwrap();
        if !inner.resources.contains_key(&resource.id) {
            return Err(RepositoryError::NotFound(format!("resource {}", resource.id)));
        }
        inner.resources.insert(resource.id, resource.clone());
        push_event(&mut inner, event);
        Ok(())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: ResourceStatus,
        chunk_ids: Option<Vec<String>>,
        event: NewOutboxEvent,
    ) -> Result<Resource, RepositoryError> {
        let mut inner = self.store.inner.lock().unwrap();
        let resource = inner
            .resources
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("resource {}", id)))?;

        if !resource.status.can_transition_to(status) {
            return Err(RepositoryError::InvalidTransition(resource.status, status));
        }

        resource.status = status;
        if let Some(chunk_ids) = chunk_ids {
            resource.chunk_ids = chunk_ids;
        }
        resource.updated_at = OffsetDateTime::now_utc();
        let updated = resource.clone();

        push_event(&mut inner, event);
        Ok(updated)
    }

    async fn delete(&self, id: Uuid, event: NewOutboxEvent) -> Result<(), RepositoryError> {
        let mut inner = self.store.inner.lock().unwrap();
        if inner.resources.remove(&id).is_none() {
            return Err(RepositoryError::NotFound(format!("resource {}", id)));
        }
        push_event(&mut inner, event);
        Ok(())
    }
}

pub struct InMemoryOutboxRepository {
    store: InMemoryStore,
}

impl InMemoryOutboxRepository {
    pub fn new(store: InMemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OutboxRepository for InMemoryOutboxRepository {
    async fn unsent(&self, limit: i64) -> Result<Vec<OutboxEvent>, RepositoryError> {
        let inner = self.store.inner.lock().unwrap();
        Ok(inner
            .events
            .iter()
            .filter(|event| !event.sent)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn mark_sent(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut inner = self.store.inner.lock().unwrap();
        let event = inner
            .events
            .iter_mut()
            .find(|event| event.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("outbox event {}", id)))?;
        event.sent = true;
        Ok(())
    }
}
