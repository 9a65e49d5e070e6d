//! Closes the loop between asynchronous downstream indexation and resource
//! status.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::services::ResourceService;
use crate::domain::TOPIC_INDEXATION_COMPLETE;
use crate::services::messaging::{MessageHandler, MessagingError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexationCompletePayload {
    resource_id: Uuid,
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Handler for `indexation_complete` messages from external indexing
/// workers. Persists the terminal status and notifies the live status
/// channel if one is still registered.
pub struct IndexationProcessor {
    resource_service: Arc<ResourceService>,
}

impl IndexationProcessor {
    pub fn new(resource_service: Arc<ResourceService>) -> Self {
        Self { resource_service }
    }

    pub fn topics() -> Vec<String> {
        vec![TOPIC_INDEXATION_COMPLETE.to_string()]
    }
}

#[async_trait]
impl MessageHandler for IndexationProcessor {
    #[instrument(name = "IndexationProcessor::handle_message", skip(self, payload, _headers))]
    async fn handle_message(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        _headers: &HashMap<String, String>,
    ) -> Result<(), MessagingError> {
        // Messages on topics this processor does not own are not an error.
        if topic != TOPIC_INDEXATION_COMPLETE {
            return Ok(());
        }

        // A payload that does not parse is a hard error back to the
        // consumer framework, which owns the redelivery/ack policy.
        let parsed: IndexationCompletePayload = serde_json::from_slice(payload)?;

        if let Some(ref message) = parsed.message {
            tracing::debug!(
                resource_id = %parsed.resource_id,
                success = parsed.success,
                "indexation outcome: {}",
                message
            );
        }

        self.resource_service
            .finish_indexation(parsed.resource_id, parsed.success)
            .await
            .map_err(|err| {
                MessagingError::Handler(format!(
                    "finish indexation for resource {}: {}",
                    parsed.resource_id, err
                ))
            })?;

        Ok(())
    }
}
