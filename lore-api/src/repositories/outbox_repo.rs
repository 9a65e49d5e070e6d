use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::OutboxEvent;

use super::repo_error::RepositoryError;

/// Read side of the outbox table. Events are appended by the resource
/// repository inside entity transactions; the processor polls and marks
/// them here.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Load up to `limit` events that have not been published yet. An event
    /// stays eligible on every poll until `mark_sent` confirms a publish.
    async fn unsent(&self, limit: i64) -> Result<Vec<OutboxEvent>, RepositoryError>;

    async fn mark_sent(&self, id: Uuid) -> Result<(), RepositoryError>;
}

pub struct PgOutboxRepository {
    pool: PgPool,
}

impl PgOutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OutboxEventRow {
    id: Uuid,
    topic: String,
    name: String,
    payload: serde_json::Value,
    sent: bool,
    event_time: OffsetDateTime,
}

impl From<OutboxEventRow> for OutboxEvent {
    fn from(row: OutboxEventRow) -> Self {
        OutboxEvent {
            id: row.id,
            topic: row.topic,
            name: row.name,
            payload: row.payload,
            sent: row.sent,
            event_time: row.event_time,
        }
    }
}

#[async_trait]
impl OutboxRepository for PgOutboxRepository {
    async fn unsent(&self, limit: i64) -> Result<Vec<OutboxEvent>, RepositoryError> {
        let rows: Vec<OutboxEventRow> = sqlx::query_as(
            r#"
            SELECT id, topic, name, payload, sent, event_time
            FROM outbox_events
            WHERE sent = FALSE
            ORDER BY event_time
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(OutboxEvent::from).collect())
    }

    async fn mark_sent(&self, id: Uuid) -> Result<(), RepositoryError> {
        let updated = sqlx::query("UPDATE outbox_events SET sent = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("outbox event {}", id)));
        }

        Ok(())
    }
}
