use thiserror::Error;

use crate::domain::ResourceStatus;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
    #[error("Invalid status transition: {0} -> {1}")]
    InvalidTransition(ResourceStatus, ResourceStatus),
}
