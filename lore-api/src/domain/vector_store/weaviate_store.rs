use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;
use weaviate::{domain::NewObject, WeaviateClient};

use super::generator::Generator;
use super::{Result, VectorStore, VectorStoreError};
use crate::domain::answer::Reference;
use crate::domain::resource::Resource;

#[derive(Debug, Clone)]
pub struct WeaviateStoreConfig {
    /// Weaviate class holding the chunks.
    pub class: String,
    /// Chunk window size in words.
    pub chunk_words: usize,
    /// Words shared between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for WeaviateStoreConfig {
    fn default() -> Self {
        Self {
            class: "LoreChunk".to_string(),
            chunk_words: 200,
            chunk_overlap: 30,
        }
    }
}

/// Vector store backed by Weaviate for chunk storage and nearText
/// retrieval, with generation delegated to a [`Generator`].
pub struct WeaviateVectorStore {
    client: WeaviateClient,
    generator: Arc<dyn Generator>,
    config: WeaviateStoreConfig,
}

impl WeaviateVectorStore {
    pub fn new(
        client: WeaviateClient,
        generator: Arc<dyn Generator>,
        config: WeaviateStoreConfig,
    ) -> Self {
        Self {
            client,
            generator,
            config,
        }
    }
}

#[async_trait]
impl VectorStore for WeaviateVectorStore {
    async fn index_resource(&self, resource: &Resource) -> Result<Vec<String>> {
        let chunks = chunk_text(
            &resource.extracted_content,
            self.config.chunk_words,
            self.config.chunk_overlap,
        );
        if chunks.is_empty() {
            return Err(VectorStoreError::Indexing(
                "resource has no extractable content".to_string(),
            ));
        }

        let objects = chunks
            .into_iter()
            .enumerate()
            .map(|(ordinal, content)| {
                NewObject::new(
                    self.config.class.clone(),
                    json!({
                        "content": content,
                        "resourceId": resource.id,
                        "ordinal": ordinal,
                    }),
                )
            })
            .collect();

        let ids = self
            .client
            .create_objects(objects)
            .await
            .map_err(|e| VectorStoreError::Indexing(e.to_string()))?;

        Ok(ids.into_iter().map(|id| id.to_string()).collect())
    }

    async fn remove_chunks(&self, chunk_ids: &[String]) -> Result<()> {
        for chunk_id in chunk_ids {
            let Ok(id) = Uuid::parse_str(chunk_id) else {
                tracing::warn!(%chunk_id, "skipping malformed chunk id");
                continue;
            };
            self.client
                .delete_object(&self.config.class, id)
                .await
                .map_err(|e| VectorStoreError::Other(e.to_string()))?;
        }
        Ok(())
    }

    async fn retrieve(&self, question: &str, limit: usize) -> Result<Vec<Reference>> {
        let chunks = self
            .client
            .near_text(&self.config.class, question, limit)
            .await
            .map_err(|e| VectorStoreError::Retrieval(e.to_string()))?;

        Ok(chunks
            .into_iter()
            .map(|chunk| Reference {
                resource_id: chunk.resource_id,
                content: chunk.content,
                score: chunk.certainty,
            })
            .collect())
    }

    async fn generate(
        &self,
        question: &str,
        references: &[Reference],
        stream: Option<mpsc::Sender<String>>,
    ) -> Result<String> {
        self.generator
            .generate(&build_prompt(question, references), stream)
            .await
    }
}

/// Slide a word window over the text, stepping by `chunk_words - overlap`.
fn chunk_text(text: &str, chunk_words: usize, chunk_overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return vec![];
    }

    let step = chunk_words.saturating_sub(chunk_overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + chunk_words).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }
    chunks
}

fn build_prompt(question: &str, references: &[Reference]) -> String {
    let context = references
        .iter()
        .map(|reference| reference.content.as_str())
        .collect::<Vec<_>>()
        .join("\n---\n");

    format!(
        "Answer the question using only the provided context.\n\
         If the context does not contain the answer, say so.\n\n\
         Context:\n{context}\n\nQuestion: {question}\n\nAnswer:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunker_windows_with_overlap() {
        let text = (1..=10).map(|n| n.to_string()).collect::<Vec<_>>().join(" ");
        let chunks = chunk_text(&text, 4, 1);

        assert_eq!(chunks[0], "1 2 3 4");
        assert_eq!(chunks[1], "4 5 6 7");
        assert_eq!(chunks[2], "7 8 9 10");
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn chunker_handles_short_text() {
        let chunks = chunk_text("only three words", 200, 30);
        assert_eq!(chunks, vec!["only three words".to_string()]);
    }

    #[test]
    fn chunker_empty_text_yields_nothing() {
        assert!(chunk_text("   ", 200, 30).is_empty());
    }

    #[test]
    fn prompt_contains_question_and_context() {
        let references = vec![Reference {
            resource_id: None,
            content: "the sky is blue".to_string(),
            score: 0.9,
        }];
        let prompt = build_prompt("what color is the sky?", &references);
        assert!(prompt.contains("the sky is blue"));
        assert!(prompt.contains("what color is the sky?"));
    }
}
