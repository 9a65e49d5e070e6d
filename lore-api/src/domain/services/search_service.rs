//! Retrieval + generation orchestration, blocking and streaming.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::instrument;

use crate::domain::answer::{Reference, SearchResult};
use crate::domain::vector_store::{VectorStore, VectorStoreError};

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Question must not be empty")]
    EmptyQuestion,
    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Number of chunks retrieved per question.
    pub retrieval_limit: usize,
    /// Buffer of the generation chunk channel.
    pub chunk_capacity: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            retrieval_limit: 5,
            chunk_capacity: 32,
        }
    }
}

/// Receiver ends of one streaming ask. References arrive before the first
/// chunk; chunks arrive in generation order; exactly one result or error
/// arrives, always after every chunk was sent.
pub struct AnswerStream {
    pub references: mpsc::Receiver<Vec<Reference>>,
    pub chunks: mpsc::Receiver<String>,
    pub results: mpsc::Receiver<SearchResult>,
    pub errors: mpsc::Receiver<SearchError>,
}

pub struct SearchService {
    vector_store: Arc<dyn VectorStore>,
    config: SearchConfig,
}

impl SearchService {
    pub fn new(vector_store: Arc<dyn VectorStore>, config: SearchConfig) -> Self {
        Self {
            vector_store,
            config,
        }
    }

    pub fn with_defaults(vector_store: Arc<dyn VectorStore>) -> Self {
        Self::new(vector_store, SearchConfig::default())
    }

    /// One-shot ask. References are pushed onto `refs_tx` the moment
    /// retrieval completes, so a caller can render citations while
    /// generation is still running.
    #[instrument(name = "SearchService::get_answer", skip(self, refs_tx))]
    pub async fn get_answer(
        &self,
        question: &str,
        refs_tx: mpsc::Sender<Vec<Reference>>,
    ) -> Result<SearchResult, SearchError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SearchError::EmptyQuestion);
        }

        let references = self
            .vector_store
            .retrieve(question, self.config.retrieval_limit)
            .await?;

        if refs_tx.try_send(references.clone()).is_err() {
            tracing::debug!("reference listener gone before retrieval finished");
        }

        let answer = self
            .vector_store
            .generate(question, &references, None)
            .await?;

        Ok(SearchResult { answer, references })
    }

    /// Streaming ask. The task drives retrieval and generation to
    /// completion; a consumer that drops its receivers simply stops being
    /// notified, it leaks nothing.
    #[instrument(name = "SearchService::get_answer_stream", skip(self))]
    pub fn get_answer_stream(&self, question: String) -> AnswerStream {
        let (refs_tx, refs_rx) = mpsc::channel(1);
        let (chunk_tx, chunk_rx) = mpsc::channel(self.config.chunk_capacity);
        let (result_tx, result_rx) = mpsc::channel(1);
        let (error_tx, error_rx) = mpsc::channel(1);

        let vector_store = self.vector_store.clone();
        let limit = self.config.retrieval_limit;

        tokio::spawn(async move {
            let question = question.trim().to_string();
            if question.is_empty() {
                let _ = error_tx.send(SearchError::EmptyQuestion).await;
                return;
            }

            let references = match vector_store.retrieve(&question, limit).await {
                Ok(references) => references,
                Err(err) => {
                    let _ = error_tx.send(err.into()).await;
                    return;
                }
            };
            let _ = refs_tx.send(references.clone()).await;

            match vector_store
                .generate(&question, &references, Some(chunk_tx))
                .await
            {
                Ok(answer) => {
                    let _ = result_tx.send(SearchResult { answer, references }).await;
                }
                Err(err) => {
                    let _ = error_tx.send(err.into()).await;
                }
            }
        });

        AnswerStream {
            references: refs_rx,
            chunks: chunk_rx,
            results: result_rx,
            errors: error_rx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vector_store::MockVectorStore;

    fn references() -> Vec<Reference> {
        vec![
            Reference {
                resource_id: Some(uuid::Uuid::new_v4()),
                content: "first chunk".to_string(),
                score: 0.9,
            },
            Reference {
                resource_id: None,
                content: "second chunk".to_string(),
                score: 0.7,
            },
        ]
    }

    fn service(vector_store: MockVectorStore) -> SearchService {
        SearchService::with_defaults(Arc::new(vector_store))
    }

    #[tokio::test]
    async fn get_answer_pushes_references_before_returning() {
        let service = service(
            MockVectorStore::new()
                .with_answer("the answer")
                .with_references(references()),
        );
        let (refs_tx, mut refs_rx) = mpsc::channel(1);

        let result = service.get_answer("why?", refs_tx).await.unwrap();

        assert_eq!(result.answer, "the answer");
        assert_eq!(result.references.len(), 2);
        // References were available on the channel independently of the
        // returned result.
        assert_eq!(refs_rx.try_recv().unwrap(), result.references);
    }

    #[tokio::test]
    async fn get_answer_rejects_blank_question() {
        let service = service(MockVectorStore::new());
        let (refs_tx, _refs_rx) = mpsc::channel(1);

        let err = service.get_answer("   ", refs_tx).await.unwrap_err();
        assert!(matches!(err, SearchError::EmptyQuestion));
    }

    #[tokio::test]
    async fn stream_delivers_refs_then_chunks_then_result() {
        let service = service(
            MockVectorStore::new()
                .with_answer("streamed answer here")
                .with_references(references()),
        );

        let mut stream = service.get_answer_stream("question".to_string());

        let refs = stream.references.recv().await.unwrap();
        assert_eq!(refs.len(), 2);

        let mut streamed = String::new();
        while let Some(chunk) = stream.chunks.recv().await {
            streamed.push_str(&chunk);
        }
        assert_eq!(streamed, "streamed answer here");

        let result = stream.results.recv().await.unwrap();
        assert_eq!(result.answer, "streamed answer here");
        assert!(stream.errors.try_recv().is_err());
    }

    #[tokio::test]
    async fn stream_surfaces_retrieval_errors_without_references() {
        let service = service(MockVectorStore::new().failing_retrieval());

        let mut stream = service.get_answer_stream("question".to_string());

        let err = stream.errors.recv().await.unwrap();
        assert!(matches!(
            err,
            SearchError::VectorStore(VectorStoreError::Retrieval(_))
        ));
        assert!(stream.references.recv().await.is_none());
        assert!(stream.results.recv().await.is_none());
    }

    #[tokio::test]
    async fn stream_surfaces_generation_errors_after_references() {
        let service = service(
            MockVectorStore::new()
                .with_references(references())
                .failing_generation(),
        );

        let mut stream = service.get_answer_stream("question".to_string());

        assert_eq!(stream.references.recv().await.unwrap().len(), 2);
        let err = stream.errors.recv().await.unwrap();
        assert!(matches!(
            err,
            SearchError::VectorStore(VectorStoreError::Generation(_))
        ));
        assert!(stream.results.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropping_the_stream_does_not_wedge_the_task() {
        let service = service(
            MockVectorStore::new()
                .with_answer("nobody is listening")
                .with_references(references()),
        );

        let stream = service.get_answer_stream("question".to_string());
        drop(stream);

        // The spawned task finishes on its own; give it a moment and make
        // sure nothing panicked by running another ask to completion.
        let mut stream = service.get_answer_stream("again".to_string());
        assert!(stream.results.recv().await.is_some());
    }
}
