//! Orchestrates the save → extract → persist → index pipeline and the
//! owner-scoped CRUD surface.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::extraction::{ContentExtractor, ExtractionError};
use crate::domain::vector_store::{VectorStore, VectorStoreError};
use crate::domain::{
    NewOutboxEvent, NewResource, Resource, ResourceStatus, ResourceStatusUpdate,
    StatusChannelRegistry,
};
use crate::repositories::{RepositoryError, ResourceRepository};

#[derive(Debug, thiserror::Error)]
pub enum ResourceServiceError {
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),
    #[error("Failed resources cannot be updated; delete and re-create")]
    UpdateOfFailedResource,
}

/// Fields a PATCH may change. New content triggers re-extraction and
/// re-indexing.
#[derive(Debug, Default, Clone)]
pub struct ResourceUpdate {
    pub name: Option<String>,
    pub content: Option<Vec<u8>>,
    pub url: Option<String>,
}

pub struct ResourceService {
    repo: Arc<dyn ResourceRepository>,
    vector_store: Arc<dyn VectorStore>,
    extractor: Arc<dyn ContentExtractor>,
    status_channels: Arc<StatusChannelRegistry>,
    indexing_timeout: Duration,
}

impl ResourceService {
    pub fn new(
        repo: Arc<dyn ResourceRepository>,
        vector_store: Arc<dyn VectorStore>,
        extractor: Arc<dyn ContentExtractor>,
        status_channels: Arc<StatusChannelRegistry>,
        indexing_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            vector_store,
            extractor,
            status_channels,
            indexing_timeout,
        }
    }

    pub fn status_channels(&self) -> Arc<StatusChannelRegistry> {
        self.status_channels.clone()
    }

    /// Accept a submission and return as soon as the initial row exists.
    ///
    /// Extraction runs synchronously, so a bad submission fails before any
    /// row or event is written. Indexing is handed to a detached task; its
    /// outcome is only observable through `status_tx` or a later poll.
    #[instrument(name = "ResourceService::save_resource", skip_all, fields(owner_id = %owner_id))]
    pub async fn save_resource(
        &self,
        owner_id: Uuid,
        new_resource: NewResource,
        status_tx: mpsc::Sender<ResourceStatusUpdate>,
    ) -> Result<Resource, ResourceServiceError> {
        let extracted = self.extractor.extract(&new_resource).await?;

        let name = crate::domain::derive_name(
            new_resource.name.as_deref(),
            new_resource.url.as_deref(),
            &extracted,
            new_resource.resource_type,
        );

        let resource = Resource::new(
            owner_id,
            name,
            new_resource.resource_type,
            new_resource.content,
            new_resource.url,
            extracted,
        );

        self.repo
            .create(&resource, NewOutboxEvent::resource_created(&resource))
            .await?;

        self.status_channels.register(resource.id, status_tx);
        self.status_channels.push(ResourceStatusUpdate {
            resource_id: resource.id,
            status: ResourceStatus::Processing,
            previous: ResourceStatus::Pending,
        });

        self.spawn_indexing(resource.clone());

        Ok(resource)
    }

    /// Detached indexing stage. Always converges the row to a terminal
    /// status, including on timeout, so nothing stays `processing` forever.
    fn spawn_indexing(&self, resource: Resource) {
        let repo = self.repo.clone();
        let vector_store = self.vector_store.clone();
        let status_channels = self.status_channels.clone();
        let timeout = self.indexing_timeout;

        tokio::spawn(async move {
            let previous = resource.status;

            let (status, chunk_ids) =
                match tokio::time::timeout(timeout, vector_store.index_resource(&resource)).await {
                    Ok(Ok(chunk_ids)) => (ResourceStatus::Completed, Some(chunk_ids)),
                    Ok(Err(err)) => {
                        tracing::error!(resource_id = %resource.id, "indexing failed: {}", err);
                        (ResourceStatus::Failed, None)
                    }
                    Err(_) => {
                        tracing::error!(resource_id = %resource.id, "indexing timed out");
                        (ResourceStatus::Failed, None)
                    }
                };

            let event = NewOutboxEvent::status_changed(resource.id, previous, status);
            match repo
                .update_status(resource.id, status, chunk_ids, event)
                .await
            {
                Ok(_) => status_channels.push(ResourceStatusUpdate {
                    resource_id: resource.id,
                    status,
                    previous,
                }),
                Err(err) => {
                    tracing::error!(
                        resource_id = %resource.id,
                        "failed to persist indexing outcome: {}",
                        err
                    );
                    // Closing the channel ends the caller's stream; the row
                    // keeps whatever status the repository last saw.
                    status_channels.remove(resource.id);
                }
            }
        });
    }

    #[instrument(name = "ResourceService::get_resource", skip(self))]
    pub async fn get_resource(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Resource, ResourceServiceError> {
        let resource = self.repo.get(id).await?;
        owned(resource, owner_id)
    }

    pub async fn list_resources(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<Resource>, ResourceServiceError> {
        Ok(self.repo.list_by_owner(owner_id).await?)
    }

    #[instrument(name = "ResourceService::update_resource", skip(self, update))]
    pub async fn update_resource(
        &self,
        owner_id: Uuid,
        id: Uuid,
        update: ResourceUpdate,
    ) -> Result<Resource, ResourceServiceError> {
        let mut resource = self.get_resource(owner_id, id).await?;

        if update.content.is_some() && resource.status == ResourceStatus::Failed {
            return Err(ResourceServiceError::UpdateOfFailedResource);
        }

        if let Some(name) = update.name {
            let trimmed = name.trim();
            if !trimmed.is_empty() {
                resource.name = trimmed.to_string();
            }
        }
        if let Some(url) = update.url {
            resource.source_url = Some(url);
        }

        let reindex = match update.content {
            Some(content) => {
                let submission = NewResource {
                    name: None,
                    resource_type: resource.resource_type,
                    content,
                    url: resource.source_url.clone(),
                };
                let extracted = self.extractor.extract(&submission).await?;

                let old_chunks = std::mem::take(&mut resource.chunk_ids);
                resource.raw_content = submission.content;
                resource.extracted_content = extracted;

                Some(old_chunks)
            }
            None => None,
        };

        self.repo
            .update(&resource, NewOutboxEvent::resource_updated(&resource))
            .await?;

        if let Some(old_chunks) = reindex {
            if let Err(err) = self.vector_store.remove_chunks(&old_chunks).await {
                tracing::warn!(resource_id = %id, "failed to remove stale chunks: {}", err);
            }
            self.spawn_indexing(resource.clone());
        }

        Ok(resource)
    }

    #[instrument(name = "ResourceService::delete_resource", skip(self))]
    pub async fn delete_resource(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<(), ResourceServiceError> {
        let resource = self.get_resource(owner_id, id).await?;

        if let Err(err) = self.vector_store.remove_chunks(&resource.chunk_ids).await {
            // The row deletion is the authoritative part; stray chunks are
            // logged for cleanup rather than blocking the delete.
            tracing::warn!(resource_id = %id, "failed to remove chunks: {}", err);
        }

        self.repo
            .delete(id, NewOutboxEvent::resource_deleted(&resource))
            .await?;

        self.status_channels.remove(id);

        Ok(())
    }

    /// Close the loop for an asynchronous indexation outcome: persist the
    /// terminal status and notify the live channel, if any. The persisted
    /// status is never lost; only the notification is best-effort.
    #[instrument(name = "ResourceService::finish_indexation", skip(self))]
    pub async fn finish_indexation(
        &self,
        resource_id: Uuid,
        success: bool,
    ) -> Result<Resource, ResourceServiceError> {
        let resource = self.repo.get(resource_id).await?;
        let previous = resource.status;
        let status = if success {
            ResourceStatus::Completed
        } else {
            ResourceStatus::Failed
        };

        let event = NewOutboxEvent::status_changed(resource_id, previous, status);
        let updated = self
            .repo
            .update_status(resource_id, status, None, event)
            .await?;

        self.status_channels.push(ResourceStatusUpdate {
            resource_id,
            status,
            previous,
        });

        Ok(updated)
    }
}

fn owned(resource: Resource, owner_id: Uuid) -> Result<Resource, ResourceServiceError> {
    if resource.owner_id != owner_id {
        // A foreign resource reads as missing so ids don't leak existence.
        return Err(ResourceServiceError::Repository(RepositoryError::NotFound(
            format!("resource {}", resource.id),
        )));
    }
    Ok(resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::extraction::MockExtractor;
    use crate::domain::vector_store::MockVectorStore;
    use crate::domain::STATUS_CHANNEL_CAPACITY;
    use crate::domain::{ResourceType, EVENT_RESOURCE_CREATED, EVENT_RESOURCE_STATUS_CHANGED};
    use crate::repositories::{InMemoryResourceRepository, InMemoryStore};

    struct Harness {
        service: ResourceService,
        store: InMemoryStore,
        vector_store: MockVectorStore,
    }

    fn harness_with(vector_store: MockVectorStore, extractor: MockExtractor) -> Harness {
        let store = InMemoryStore::new();
        let service = ResourceService::new(
            Arc::new(InMemoryResourceRepository::new(store.clone())),
            Arc::new(vector_store.clone()),
            Arc::new(extractor),
            Arc::new(StatusChannelRegistry::new()),
            Duration::from_secs(5),
        );
        Harness {
            service,
            store,
            vector_store,
        }
    }

    fn harness() -> Harness {
        harness_with(MockVectorStore::new(), MockExtractor::passthrough())
    }

    fn text_submission(content: &str) -> NewResource {
        NewResource {
            name: None,
            resource_type: ResourceType::Text,
            content: content.as_bytes().to_vec(),
            url: None,
        }
    }

    fn status_channel() -> (
        mpsc::Sender<ResourceStatusUpdate>,
        mpsc::Receiver<ResourceStatusUpdate>,
    ) {
        mpsc::channel(STATUS_CHANNEL_CAPACITY)
    }

    #[tokio::test]
    async fn save_returns_processing_resource_and_completes_async() {
        let harness = harness();
        let (tx, mut rx) = status_channel();
        let owner = Uuid::new_v4();

        let resource = harness
            .service
            .save_resource(owner, text_submission("hello world"), tx)
            .await
            .unwrap();

        assert_eq!(resource.status, ResourceStatus::Processing);
        assert_eq!(resource.extracted_content, "hello world");
        assert!(!resource.name.is_empty());

        let first = rx.recv().await.unwrap();
        assert_eq!(first.status, ResourceStatus::Processing);
        let terminal = rx.recv().await.unwrap();
        assert_eq!(terminal.status, ResourceStatus::Completed);
        assert_eq!(terminal.previous, ResourceStatus::Processing);
        // Terminal update closes the channel.
        assert!(rx.recv().await.is_none());

        let stored = harness.store.resource(resource.id).unwrap();
        assert_eq!(stored.status, ResourceStatus::Completed);
        assert_eq!(stored.chunk_ids.len(), 2);
        assert_eq!(harness.vector_store.index_calls(), 1);

        let event_names: Vec<String> = harness
            .store
            .events()
            .into_iter()
            .map(|event| event.name)
            .collect();
        assert_eq!(
            event_names,
            vec![
                EVENT_RESOURCE_CREATED.to_string(),
                EVENT_RESOURCE_STATUS_CHANGED.to_string()
            ]
        );
    }

    #[tokio::test]
    async fn failing_extractor_creates_no_row_and_no_event() {
        let harness = harness_with(
            MockVectorStore::new(),
            MockExtractor::failing(|| ExtractionError::Fetch("connection refused".to_string())),
        );
        let (tx, _rx) = status_channel();

        let submission = NewResource {
            name: None,
            resource_type: ResourceType::Url,
            content: vec![],
            url: Some("https://x/doc.pdf".to_string()),
        };
        let err = harness
            .service
            .save_resource(Uuid::new_v4(), submission, tx)
            .await
            .unwrap_err();

        assert!(matches!(err, ResourceServiceError::Extraction(_)));
        assert_eq!(harness.store.resource_count(), 0);
        assert!(harness.store.events().is_empty());
        assert_eq!(harness.vector_store.index_calls(), 0);
    }

    #[tokio::test]
    async fn indexing_failure_converges_to_failed() {
        let harness = harness_with(
            MockVectorStore::new().failing_indexing(),
            MockExtractor::passthrough(),
        );
        let (tx, mut rx) = status_channel();

        let resource = harness
            .service
            .save_resource(Uuid::new_v4(), text_submission("doomed"), tx)
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().status, ResourceStatus::Processing);
        assert_eq!(rx.recv().await.unwrap().status, ResourceStatus::Failed);

        let stored = harness.store.resource(resource.id).unwrap();
        assert_eq!(stored.status, ResourceStatus::Failed);
        assert!(stored.chunk_ids.is_empty());
    }

    #[tokio::test]
    async fn foreign_resource_reads_as_not_found() {
        let harness = harness();
        let (tx, mut rx) = status_channel();
        let owner = Uuid::new_v4();

        let resource = harness
            .service
            .save_resource(owner, text_submission("mine"), tx)
            .await
            .unwrap();
        while rx.recv().await.is_some() {}

        let err = harness
            .service
            .get_resource(Uuid::new_v4(), resource.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResourceServiceError::Repository(RepositoryError::NotFound(_))
        ));

        // The owner still sees it.
        assert!(harness.service.get_resource(owner, resource.id).await.is_ok());
    }

    #[tokio::test]
    async fn rename_does_not_touch_the_index() {
        let harness = harness();
        let (tx, mut rx) = status_channel();
        let owner = Uuid::new_v4();

        let resource = harness
            .service
            .save_resource(owner, text_submission("some text"), tx)
            .await
            .unwrap();
        while rx.recv().await.is_some() {}

        let updated = harness
            .service
            .update_resource(
                owner,
                resource.id,
                ResourceUpdate {
                    name: Some("renamed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "renamed");
        assert_eq!(harness.vector_store.index_calls(), 1);
        assert!(harness.vector_store.removed_chunks().is_empty());
    }

    #[tokio::test]
    async fn content_update_swaps_chunks_and_reindexes() {
        let harness = harness();
        let (tx, mut rx) = status_channel();
        let owner = Uuid::new_v4();

        let resource = harness
            .service
            .save_resource(owner, text_submission("v1"), tx)
            .await
            .unwrap();
        while rx.recv().await.is_some() {}
        let old_chunks = harness.store.resource(resource.id).unwrap().chunk_ids;

        harness
            .service
            .update_resource(
                owner,
                resource.id,
                ResourceUpdate {
                    content: Some(b"v2".to_vec()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // The old chunks were handed to the vector store for removal.
        assert_eq!(harness.vector_store.removed_chunks(), old_chunks);

        // Second indexing pass converges back to completed.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        loop {
            let stored = harness.store.resource(resource.id).unwrap();
            if stored.status == ResourceStatus::Completed && stored.extracted_content == "v2" {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "reindex never completed");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(harness.vector_store.index_calls(), 2);
    }

    #[tokio::test]
    async fn content_update_of_failed_resource_is_rejected() {
        let harness = harness_with(
            MockVectorStore::new().failing_indexing(),
            MockExtractor::passthrough(),
        );
        let (tx, mut rx) = status_channel();
        let owner = Uuid::new_v4();

        let resource = harness
            .service
            .save_resource(owner, text_submission("will fail"), tx)
            .await
            .unwrap();
        while rx.recv().await.is_some() {}

        let err = harness
            .service
            .update_resource(
                owner,
                resource.id,
                ResourceUpdate {
                    content: Some(b"retry".to_vec()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ResourceServiceError::UpdateOfFailedResource));
    }

    #[tokio::test]
    async fn delete_cascades_chunks_and_writes_event() {
        let harness = harness();
        let (tx, mut rx) = status_channel();
        let owner = Uuid::new_v4();

        let resource = harness
            .service
            .save_resource(owner, text_submission("to delete"), tx)
            .await
            .unwrap();
        while rx.recv().await.is_some() {}
        let chunks = harness.store.resource(resource.id).unwrap().chunk_ids;

        harness
            .service
            .delete_resource(owner, resource.id)
            .await
            .unwrap();

        assert!(harness.store.resource(resource.id).is_none());
        assert_eq!(harness.vector_store.removed_chunks(), chunks);
        assert!(harness
            .store
            .events()
            .iter()
            .any(|event| event.name == "resource.deleted"));
    }

    #[tokio::test]
    async fn finish_indexation_without_channel_still_persists() {
        let harness = harness();
        let (tx, mut rx) = status_channel();
        let owner = Uuid::new_v4();

        let resource = harness
            .service
            .save_resource(owner, text_submission("late completion"), tx)
            .await
            .unwrap();
        while rx.recv().await.is_some() {}

        // Channel already closed and removed; a redelivered completion must
        // still persist.
        let updated = harness
            .service
            .finish_indexation(resource.id, true)
            .await
            .unwrap();
        assert_eq!(updated.status, ResourceStatus::Completed);
    }

    #[tokio::test]
    async fn finish_indexation_unknown_resource_is_not_found() {
        let harness = harness();
        let err = harness
            .service
            .finish_indexation(Uuid::new_v4(), true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResourceServiceError::Repository(RepositoryError::NotFound(_))
        ));
    }
}
