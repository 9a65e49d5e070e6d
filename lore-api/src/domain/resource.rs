use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResourceType {
    Url,
    Pdf,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResourceStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ResourceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResourceStatus::Completed | ResourceStatus::Failed)
    }

    /// The status machine only moves forward: `pending → processing →
    /// completed`, with `failed` reachable from any non-terminal state.
    /// Terminal self-transitions are allowed so redelivered completion
    /// messages stay idempotent.
    pub fn can_transition_to(&self, next: ResourceStatus) -> bool {
        use ResourceStatus::*;

        if *self == next {
            return true;
        }

        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Failed) | (Processing, Completed) | (Processing, Failed)
        )
    }
}

/// A user-submitted document tracked through the ingestion lifecycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub resource_type: ResourceType,
    #[serde(skip_serializing)]
    pub raw_content: Vec<u8>,
    pub source_url: Option<String>,
    pub extracted_content: String,
    pub chunk_ids: Vec<String>,
    pub status: ResourceStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Resource {
    pub fn new(
        owner_id: Uuid,
        name: String,
        resource_type: ResourceType,
        raw_content: Vec<u8>,
        source_url: Option<String>,
        extracted_content: String,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name,
            resource_type,
            raw_content,
            source_url,
            extracted_content,
            chunk_ids: Vec::new(),
            status: ResourceStatus::Processing,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input accepted by the save pipeline, before extraction.
#[derive(Debug, Clone)]
pub struct NewResource {
    pub name: Option<String>,
    pub resource_type: ResourceType,
    pub content: Vec<u8>,
    pub url: Option<String>,
}

/// Ephemeral status notification pushed onto a per-resource channel.
///
/// `previous` is snapshotted before the row is mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatusUpdate {
    pub resource_id: Uuid,
    pub status: ResourceStatus,
    pub previous: ResourceStatus,
}

/// Derive a non-empty display name for a resource that was submitted
/// without one.
pub fn derive_name(
    explicit: Option<&str>,
    source_url: Option<&str>,
    extracted_content: &str,
    resource_type: ResourceType,
) -> String {
    if let Some(name) = explicit {
        let trimmed = name.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    if let Some(url) = source_url {
        let stem = url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .split('?')
            .next()
            .unwrap_or_default();
        if !stem.is_empty() && stem != "https:" && stem != "http:" {
            return stem.to_string();
        }
    }

    let first_line = extracted_content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    if !first_line.is_empty() {
        let mut name: String = first_line.chars().take(60).collect();
        if first_line.chars().count() > 60 {
            name.push('…');
        }
        return name;
    }

    format!("Untitled {}", resource_type)
}
