//! Answer generation behind the vector store adapter.

mod mock;
mod openai;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::Result;

pub use mock::MockGenerator;
pub use openai::OpenAiGenerator;

/// LLM text generation with optional incremental streaming.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion for `prompt`. When `stream` is supplied, text
    /// fragments are pushed onto it as they are produced; the sender being
    /// dropped by the consumer stops nothing, it only stops the notifications.
    async fn generate(&self, prompt: &str, stream: Option<mpsc::Sender<String>>)
        -> Result<String>;
}
