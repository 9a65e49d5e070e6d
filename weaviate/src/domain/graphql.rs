use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub(crate) struct GraphQlRequest {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse {
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlError {
    pub message: String,
}

/// One chunk returned by a nearText query, with its similarity certainty.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub id: Uuid,
    pub resource_id: Option<Uuid>,
    pub content: String,
    pub certainty: f64,
}

impl RetrievedChunk {
    /// Parse the `Get.<Class>` array of a GraphQL response into chunks.
    ///
    /// Entries missing the expected fields are skipped rather than failing
    /// the whole result set.
    pub(crate) fn from_get_result(data: &serde_json::Value, class: &str) -> Vec<RetrievedChunk> {
        data.get("Get")
            .and_then(|get| get.get(class))
            .and_then(|items| items.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let additional = item.get("_additional")?;
                        let id = additional
                            .get("id")
                            .and_then(|v| v.as_str())
                            .and_then(|s| Uuid::parse_str(s).ok())?;
                        let certainty = additional
                            .get("certainty")
                            .and_then(|v| v.as_f64())
                            .unwrap_or_default();
                        let content = item
                            .get("content")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string();
                        let resource_id = item
                            .get("resourceId")
                            .and_then(|v| v.as_str())
                            .and_then(|s| Uuid::parse_str(s).ok());

                        Some(RetrievedChunk {
                            id,
                            resource_id,
                            content,
                            certainty,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
