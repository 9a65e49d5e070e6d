use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    domain::{
        BatchObjectResult, BatchObjectsRequest, GraphQlRequest, GraphQlResponse, NewObject,
        RetrievedChunk,
    },
    WeaviateURL,
};

pub struct WeaviateClient {
    base_url: WeaviateURL,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl WeaviateClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: WeaviateURL::new(base_url),
            api_key,
            http: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, url: &WeaviateURL) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, url.as_ref());
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, WeaviateError> {
        let resp = builder
            .send()
            .await
            .map_err(|e| WeaviateError::Response(e.to_string()))?;

        let status = resp.status();
        if status == 401 || status == 403 {
            return Err(WeaviateError::Unauthorized);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(WeaviateError::Response(format!("{}: {}", status, body)));
        }

        resp.json::<T>()
            .await
            .map_err(|e| WeaviateError::Parsing(format!("failed to parse response as JSON: {}", e)))
    }

    /// Store a batch of objects, returning the ids that were accepted.
    ///
    /// Weaviate reports per-object failures inline; a batch where every
    /// object failed is treated as an error.
    pub async fn create_objects(
        &self,
        objects: Vec<NewObject>,
    ) -> Result<Vec<Uuid>, WeaviateError> {
        if objects.is_empty() {
            return Ok(vec![]);
        }

        let url = self.base_url.append_path("/v1/batch/objects");
        let results: Vec<BatchObjectResult> = self
            .send(
                self.request(reqwest::Method::POST, &url)
                    .json(&BatchObjectsRequest { objects }),
            )
            .await?;

        let mut accepted = Vec::with_capacity(results.len());
        for result in &results {
            match result.error_message() {
                Some(message) => {
                    tracing::warn!(object_id = %result.id, %message, "object rejected by batch insert");
                }
                None => accepted.push(result.id),
            }
        }

        if accepted.is_empty() {
            return Err(WeaviateError::Response(
                "all objects rejected by batch insert".to_string(),
            ));
        }

        Ok(accepted)
    }

    pub async fn delete_object(&self, class: &str, id: Uuid) -> Result<(), WeaviateError> {
        let url = self
            .base_url
            .append_path(&format!("/v1/objects/{}/{}", class, id));

        let resp = self
            .request(reqwest::Method::DELETE, &url)
            .send()
            .await
            .map_err(|e| WeaviateError::Response(e.to_string()))?;

        // 404 is fine: the object is already gone.
        if !resp.status().is_success() && resp.status() != 404 {
            return Err(WeaviateError::Response(resp.status().to_string()));
        }

        Ok(())
    }

    /// Run a nearText similarity query against the given class.
    pub async fn near_text(
        &self,
        class: &str,
        concept: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, WeaviateError> {
        // serde_json string serialization doubles as GraphQL string escaping.
        let escaped = serde_json::to_string(concept)
            .map_err(|e| WeaviateError::Parsing(e.to_string()))?;
        let query = format!(
            "{{ Get {{ {class}(nearText: {{ concepts: [{escaped}] }}, limit: {limit}) \
             {{ content resourceId _additional {{ id certainty }} }} }} }}",
        );

        let url = self.base_url.append_path("/v1/graphql");
        let response: GraphQlResponse = self
            .send(self.request(reqwest::Method::POST, &url).json(&GraphQlRequest { query }))
            .await?;

        if let Some(errors) = response.errors {
            let messages = errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(WeaviateError::GraphQl(messages));
        }

        let data = response
            .data
            .ok_or_else(|| WeaviateError::Parsing("GraphQL response without data".to_string()))?;

        Ok(RetrievedChunk::from_get_result(&data, class))
    }
}

#[derive(Error, Debug)]
pub enum WeaviateError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("ResponseError: {0}")]
    Response(String),
    #[error("ParsingError: {0}")]
    Parsing(String),
    #[error("GraphQlError: {0}")]
    GraphQl(String),
}
