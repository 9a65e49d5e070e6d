//! Mock generator for streaming tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::Generator;
use crate::domain::vector_store::{Result, VectorStoreError};

/// Generator that streams a fixed answer word by word.
#[derive(Clone)]
pub struct MockGenerator {
    answer: String,
    fail: bool,
    call_count: Arc<AtomicUsize>,
}

impl MockGenerator {
    pub fn answering(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            fail: false,
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: String::new(),
            fail: true,
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        stream: Option<mpsc::Sender<String>>,
    ) -> Result<String> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if self.fail {
            return Err(VectorStoreError::Generation("mock failure".to_string()));
        }

        if let Some(chunks) = stream {
            for word in self.answer.split_inclusive(' ') {
                let _ = chunks.send(word.to_string()).await;
            }
        }

        Ok(self.answer.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn streams_words_in_order() {
        let generator = MockGenerator::answering("one two three");
        let (tx, mut rx) = mpsc::channel(16);

        let answer = generator.generate("q", Some(tx)).await.unwrap();
        assert_eq!(answer, "one two three");

        let mut streamed = String::new();
        while let Some(chunk) = rx.recv().await {
            streamed.push_str(&chunk);
        }
        assert_eq!(streamed, "one two three");
        assert_eq!(generator.call_count(), 1);
    }
}
