use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{NewOutboxEvent, Resource, ResourceStatus, ResourceType};

use super::repo_error::RepositoryError;

/// CRUD on Resource rows. Every mutation persists the accompanying outbox
/// event in the same transaction as the entity change.
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    async fn create(
        &self,
        resource: &Resource,
        event: NewOutboxEvent,
    ) -> Result<(), RepositoryError>;

    async fn get(&self, id: Uuid) -> Result<Resource, RepositoryError>;

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Resource>, RepositoryError>;

    async fn update(
        &self,
        resource: &Resource,
        event: NewOutboxEvent,
    ) -> Result<(), RepositoryError>;

    /// Transition a resource's status, optionally replacing its chunk ids.
    /// Rejects transitions the status machine does not allow and returns
    /// the updated row.
    async fn update_status(
        &self,
        id: Uuid,
        status: ResourceStatus,
        chunk_ids: Option<Vec<String>>,
        event: NewOutboxEvent,
    ) -> Result<Resource, RepositoryError>;

    async fn delete(&self, id: Uuid, event: NewOutboxEvent) -> Result<(), RepositoryError>;
}

pub struct PgResourceRepository {
    pool: PgPool,
}

impl PgResourceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ResourceRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    resource_type: String,
    raw_content: Vec<u8>,
    source_url: Option<String>,
    extracted_content: String,
    chunk_ids: Vec<String>,
    status: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<ResourceRow> for Resource {
    type Error = RepositoryError;

    fn try_from(row: ResourceRow) -> Result<Self, Self::Error> {
        let resource_type: ResourceType = row
            .resource_type
            .parse()
            .map_err(|_| RepositoryError::CorruptRow(format!("type '{}'", row.resource_type)))?;
        let status: ResourceStatus = row
            .status
            .parse()
            .map_err(|_| RepositoryError::CorruptRow(format!("status '{}'", row.status)))?;

        Ok(Resource {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            resource_type,
            raw_content: row.raw_content,
            source_url: row.source_url,
            extracted_content: row.extracted_content,
            chunk_ids: row.chunk_ids,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_RESOURCE: &str = r#"
    SELECT id, owner_id, name, resource_type, raw_content, source_url,
           extracted_content, chunk_ids, status, created_at, updated_at
    FROM resources
"#;

pub(super) async fn insert_event(
    tx: &mut Transaction<'_, Postgres>,
    event: &NewOutboxEvent,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        INSERT INTO outbox_events (id, topic, name, payload, sent, event_time)
        VALUES ($1, $2, $3, $4, FALSE, now())
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&event.topic)
    .bind(&event.name)
    .bind(&event.payload)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[async_trait]
impl ResourceRepository for PgResourceRepository {
    async fn create(
        &self,
        resource: &Resource,
        event: NewOutboxEvent,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO resources
                (id, owner_id, name, resource_type, raw_content, source_url,
                 extracted_content, chunk_ids, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(resource.id)
        .bind(resource.owner_id)
        .bind(&resource.name)
        .bind(resource.resource_type.to_string())
        .bind(&resource.raw_content)
        .bind(&resource.source_url)
        .bind(&resource.extracted_content)
        .bind(&resource.chunk_ids)
        .bind(resource.status.to_string())
        .bind(resource.created_at)
        .bind(resource.updated_at)
        .execute(&mut *tx)
        .await?;

        insert_event(&mut tx, &event).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Resource, RepositoryError> {
        let row: Option<ResourceRow> =
            sqlx::query_as(&format!("{} WHERE id = $1", SELECT_RESOURCE))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.ok_or_else(|| RepositoryError::NotFound(format!("resource {}", id)))?
            .try_into()
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Resource>, RepositoryError> {
        let rows: Vec<ResourceRow> = sqlx::query_as(&format!(
            "{} WHERE owner_id = $1 ORDER BY created_at DESC",
            SELECT_RESOURCE
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Resource::try_from).collect()
    }

    async fn update(
        &self,
        resource: &Resource,
        event: NewOutboxEvent,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE resources
            SET name = $2, raw_content = $3, source_url = $4,
                extracted_content = $5, chunk_ids = $6, status = $7,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(resource.id)
        .bind(&resource.name)
        .bind(&resource.raw_content)
        .bind(&resource.source_url)
        .bind(&resource.extracted_content)
        .bind(&resource.chunk_ids)
        .bind(resource.status.to_string())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("resource {}", resource.id)));
        }

        insert_event(&mut tx, &event).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: ResourceStatus,
        chunk_ids: Option<Vec<String>>,
        event: NewOutboxEvent,
    ) -> Result<Resource, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<ResourceRow> =
            sqlx::query_as(&format!("{} WHERE id = $1 FOR UPDATE", SELECT_RESOURCE))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let mut resource: Resource = row
            .ok_or_else(|| RepositoryError::NotFound(format!("resource {}", id)))?
            .try_into()?;

        if !resource.status.can_transition_to(status) {
            return Err(RepositoryError::InvalidTransition(resource.status, status));
        }

        sqlx::query(
            r#"
            UPDATE resources
            SET status = $2, chunk_ids = COALESCE($3, chunk_ids), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(&chunk_ids)
        .execute(&mut *tx)
        .await?;

        insert_event(&mut tx, &event).await?;
        tx.commit().await?;

        resource.status = status;
        if let Some(chunk_ids) = chunk_ids {
            resource.chunk_ids = chunk_ids;
        }
        resource.updated_at = OffsetDateTime::now_utc();

        Ok(resource)
    }

    async fn delete(&self, id: Uuid, event: NewOutboxEvent) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM resources WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("resource {}", id)));
        }

        insert_event(&mut tx, &event).await?;
        tx.commit().await?;

        Ok(())
    }
}
