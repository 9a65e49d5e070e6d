use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single object to be stored through the batch objects endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct NewObject {
    pub class: String,
    pub id: Uuid,
    pub properties: serde_json::Value,
}

impl NewObject {
    pub fn new(class: impl Into<String>, properties: serde_json::Value) -> Self {
        Self {
            class: class.into(),
            id: Uuid::new_v4(),
            properties,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchObjectsRequest {
    pub objects: Vec<NewObject>,
}

/// Per-object outcome of a batch insert. Weaviate reports errors inline
/// rather than failing the whole batch.
#[derive(Debug, Deserialize)]
pub struct BatchObjectResult {
    pub id: Uuid,
    #[serde(default)]
    pub result: Option<BatchResultStatus>,
}

#[derive(Debug, Deserialize)]
pub struct BatchResultStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub errors: Option<BatchResultErrors>,
}

#[derive(Debug, Deserialize)]
pub struct BatchResultErrors {
    #[serde(default)]
    pub error: Vec<BatchResultError>,
}

#[derive(Debug, Deserialize)]
pub struct BatchResultError {
    pub message: String,
}

impl BatchObjectResult {
    pub fn error_message(&self) -> Option<String> {
        self.result
            .as_ref()
            .and_then(|r| r.errors.as_ref())
            .and_then(|e| e.error.first())
            .map(|e| e.message.clone())
    }
}
