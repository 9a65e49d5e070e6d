//! Vector store abstraction: chunk indexing, similarity retrieval, and
//! retrieval-augmented generation.

pub mod generator;
mod mock;
mod weaviate_store;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::answer::Reference;
use super::resource::Resource;

pub use mock::MockVectorStore;
pub use weaviate_store::{WeaviateStoreConfig, WeaviateVectorStore};

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("Indexing failed: {0}")]
    Indexing(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, VectorStoreError>;

/// Backing store for extracted content: chunking + embedding + similarity
/// search + grounded generation.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Chunk, embed and store a resource's extracted content. Returns the
    /// ids of the stored chunks.
    async fn index_resource(&self, resource: &Resource) -> Result<Vec<String>>;

    /// Remove previously stored chunks. Unknown ids are ignored.
    async fn remove_chunks(&self, chunk_ids: &[String]) -> Result<()>;

    /// Fetch the chunks most relevant to a question, best first.
    async fn retrieve(&self, question: &str, limit: usize) -> Result<Vec<Reference>>;

    /// Generate an answer grounded on the given references. When `stream`
    /// is supplied, incremental text is pushed onto it in generation order;
    /// the full answer is returned either way.
    async fn generate(
        &self,
        question: &str,
        references: &[Reference],
        stream: Option<mpsc::Sender<String>>,
    ) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_object_safe(_: &dyn VectorStore) {}
}
