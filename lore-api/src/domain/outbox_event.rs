use serde::Serialize;
use serde_json::json;
use time::OffsetDateTime;
use uuid::Uuid;

use super::resource::{Resource, ResourceStatus};

/// Topic carrying resource lifecycle events for downstream consumers.
pub const TOPIC_RESOURCE_EVENTS: &str = "resource_events";
/// Topic on which the indexation worker reports back.
pub const TOPIC_INDEXATION_COMPLETE: &str = "indexation_complete";

pub const EVENT_RESOURCE_CREATED: &str = "resource.created";
pub const EVENT_RESOURCE_UPDATED: &str = "resource.updated";
pub const EVENT_RESOURCE_DELETED: &str = "resource.deleted";
pub const EVENT_RESOURCE_STATUS_CHANGED: &str = "resource.status_changed";

/// A domain event persisted in the same transaction as the entity change it
/// describes. `sent` flips only after a confirmed publish; until then the
/// event stays eligible for redelivery.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEvent {
    pub id: Uuid,
    pub topic: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub sent: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub event_time: OffsetDateTime,
}

impl OutboxEvent {
    /// Wire envelope published to the broker. The event id doubles as an
    /// idempotency key for downstream deduplication.
    pub fn envelope(&self) -> serde_json::Value {
        json!({
            "eventId": self.id,
            "name": self.name,
            "eventTime": self.event_time.unix_timestamp(),
            "payload": self.payload,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewOutboxEvent {
    pub topic: String,
    pub name: String,
    pub payload: serde_json::Value,
}

impl NewOutboxEvent {
    pub fn resource_created(resource: &Resource) -> Self {
        Self {
            topic: TOPIC_RESOURCE_EVENTS.to_string(),
            name: EVENT_RESOURCE_CREATED.to_string(),
            payload: json!({
                "resourceId": resource.id,
                "ownerId": resource.owner_id,
                "resourceType": resource.resource_type,
                "name": resource.name,
            }),
        }
    }

    pub fn resource_updated(resource: &Resource) -> Self {
        Self {
            topic: TOPIC_RESOURCE_EVENTS.to_string(),
            name: EVENT_RESOURCE_UPDATED.to_string(),
            payload: json!({
                "resourceId": resource.id,
                "ownerId": resource.owner_id,
                "name": resource.name,
            }),
        }
    }

    pub fn resource_deleted(resource: &Resource) -> Self {
        Self {
            topic: TOPIC_RESOURCE_EVENTS.to_string(),
            name: EVENT_RESOURCE_DELETED.to_string(),
            payload: json!({
                "resourceId": resource.id,
                "ownerId": resource.owner_id,
            }),
        }
    }

    /// `previous` must be captured before the row is mutated, so the payload
    /// carries a genuine old→new pair.
    pub fn status_changed(
        resource_id: Uuid,
        previous: ResourceStatus,
        status: ResourceStatus,
    ) -> Self {
        Self {
            topic: TOPIC_RESOURCE_EVENTS.to_string(),
            name: EVENT_RESOURCE_STATUS_CHANGED.to_string(),
            payload: json!({
                "resourceId": resource_id,
                "previousStatus": previous,
                "status": status,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_changed_payload_keeps_old_status() {
        let id = Uuid::new_v4();
        let event = NewOutboxEvent::status_changed(
            id,
            ResourceStatus::Processing,
            ResourceStatus::Completed,
        );

        assert_eq!(event.name, EVENT_RESOURCE_STATUS_CHANGED);
        assert_eq!(event.payload["previousStatus"], "processing");
        assert_eq!(event.payload["status"], "completed");
        assert_eq!(event.payload["resourceId"], id.to_string());
    }
}
