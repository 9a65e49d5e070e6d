use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::Generator;
use crate::domain::vector_store::{Result, VectorStoreError};

/// Chat-completions generator against an OpenAI-compatible endpoint.
pub struct OpenAiGenerator {
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn new(api_url: String, api_key: String, model: String, max_tokens: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| VectorStoreError::Generation(e.to_string()))?;

        Ok(Self {
            api_url,
            api_key,
            model,
            max_tokens,
            client,
        })
    }

    fn request_body(&self, prompt: &str, stream: bool) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            stream,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt.to_string(),
            }],
        }
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt, stream))
            .send()
            .await
            .map_err(|e| VectorStoreError::Generation(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VectorStoreError::Generation(format!("{}: {}", status, body)));
        }

        Ok(response)
    }

    async fn generate_blocking(&self, prompt: &str) -> Result<String> {
        let parsed: ChatResponse = self
            .send(prompt, false)
            .await?
            .json()
            .await
            .map_err(|e| VectorStoreError::Generation(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .map(|message| message.content)
            .ok_or_else(|| VectorStoreError::Generation("response missing content".to_string()))
    }

    async fn generate_streaming(
        &self,
        prompt: &str,
        chunks: mpsc::Sender<String>,
    ) -> Result<String> {
        let response = self.send(prompt, true).await?;

        let mut answer = String::new();
        let mut buffer = String::new();
        let mut body = response.bytes_stream();

        while let Some(piece) = body.next().await {
            let piece = piece.map_err(|e| VectorStoreError::Generation(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&piece));

            // SSE frames are newline-delimited; a partial line stays in the
            // buffer until its terminator arrives.
            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer.drain(..=newline);

                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data.is_empty() || data == "[DONE]" {
                    continue;
                }

                let delta: StreamChunk = match serde_json::from_str(data) {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        tracing::warn!("skipping malformed stream frame: {}", err);
                        continue;
                    }
                };

                if let Some(content) = delta
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta)
                    .and_then(|delta| delta.content)
                {
                    answer.push_str(&content);
                    // The consumer may have gone away; the answer is still
                    // assembled for the final result.
                    let _ = chunks.send(content).await;
                }
            }
        }

        if answer.is_empty() {
            return Err(VectorStoreError::Generation(
                "stream ended without content".to_string(),
            ));
        }

        Ok(answer)
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(
        &self,
        prompt: &str,
        stream: Option<mpsc::Sender<String>>,
    ) -> Result<String> {
        match stream {
            Some(chunks) => self.generate_streaming(prompt, chunks).await,
            None => self.generate_blocking(prompt).await,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    stream: bool,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatResponseMessage>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
