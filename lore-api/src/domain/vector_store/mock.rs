//! Mock vector store for service and pipeline tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Result, VectorStore, VectorStoreError};
use crate::domain::answer::Reference;
use crate::domain::resource::Resource;

/// Vector store with canned responses, scripted failures and call counters.
#[derive(Clone, Default)]
pub struct MockVectorStore {
    references: Arc<Mutex<Vec<Reference>>>,
    answer: Arc<Mutex<String>>,
    fail_indexing: Arc<Mutex<bool>>,
    fail_retrieval: Arc<Mutex<bool>>,
    fail_generation: Arc<Mutex<bool>>,
    stall_generation: Arc<Mutex<bool>>,
    index_calls: Arc<AtomicUsize>,
    retrieve_calls: Arc<AtomicUsize>,
    generate_calls: Arc<AtomicUsize>,
    removed_chunks: Arc<Mutex<Vec<String>>>,
}

impl MockVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answer(self, answer: impl Into<String>) -> Self {
        *self.answer.lock().unwrap() = answer.into();
        self
    }

    pub fn with_references(self, references: Vec<Reference>) -> Self {
        *self.references.lock().unwrap() = references;
        self
    }

    pub fn failing_indexing(self) -> Self {
        *self.fail_indexing.lock().unwrap() = true;
        self
    }

    pub fn failing_retrieval(self) -> Self {
        *self.fail_retrieval.lock().unwrap() = true;
        self
    }

    pub fn failing_generation(self) -> Self {
        *self.fail_generation.lock().unwrap() = true;
        self
    }

    /// Generation never completes; for cancellation tests.
    pub fn stalling_generation(self) -> Self {
        *self.stall_generation.lock().unwrap() = true;
        self
    }

    pub fn index_calls(&self) -> usize {
        self.index_calls.load(Ordering::SeqCst)
    }

    pub fn retrieve_calls(&self) -> usize {
        self.retrieve_calls.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn removed_chunks(&self) -> Vec<String> {
        self.removed_chunks.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorStore for MockVectorStore {
    async fn index_resource(&self, resource: &Resource) -> Result<Vec<String>> {
        self.index_calls.fetch_add(1, Ordering::SeqCst);

        if *self.fail_indexing.lock().unwrap() {
            return Err(VectorStoreError::Indexing("mock indexing failure".to_string()));
        }

        Ok(vec![
            format!("{}-chunk-0", resource.id),
            format!("{}-chunk-1", resource.id),
        ])
    }

    async fn remove_chunks(&self, chunk_ids: &[String]) -> Result<()> {
        self.removed_chunks
            .lock()
            .unwrap()
            .extend(chunk_ids.iter().cloned());
        Ok(())
    }

    async fn retrieve(&self, _question: &str, limit: usize) -> Result<Vec<Reference>> {
        self.retrieve_calls.fetch_add(1, Ordering::SeqCst);

        if *self.fail_retrieval.lock().unwrap() {
            return Err(VectorStoreError::Retrieval("mock retrieval failure".to_string()));
        }

        let references = self.references.lock().unwrap();
        Ok(references.iter().take(limit).cloned().collect())
    }

    async fn generate(
        &self,
        _question: &str,
        _references: &[Reference],
        stream: Option<mpsc::Sender<String>>,
    ) -> Result<String> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);

        if *self.fail_generation.lock().unwrap() {
            return Err(VectorStoreError::Generation("mock generation failure".to_string()));
        }

        let stall = *self.stall_generation.lock().unwrap();
        if stall {
            std::future::pending::<()>().await;
        }

        let answer = self.answer.lock().unwrap().clone();
        if let Some(chunks) = stream {
            for word in answer.split_inclusive(' ') {
                let _ = chunks.send(word.to_string()).await;
            }
        }

        Ok(answer)
    }
}
