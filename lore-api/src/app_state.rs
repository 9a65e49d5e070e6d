use std::sync::Arc;

use sqlx::PgPool;

use crate::domain::services::{ResourceService, SearchService};
use crate::domain::ProcessRegistry;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: Arc<PgPool>,
    pub resource_service: Arc<ResourceService>,
    pub search_service: Arc<SearchService>,
    pub process_registry: Arc<ProcessRegistry>,
}

impl AppState {
    pub fn new(
        db_pool: PgPool,
        resource_service: Arc<ResourceService>,
        search_service: Arc<SearchService>,
    ) -> Self {
        Self {
            db_pool: Arc::new(db_pool),
            resource_service,
            search_service,
            process_registry: Arc::new(ProcessRegistry::new()),
        }
    }
}
