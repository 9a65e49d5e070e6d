mod app_state;
mod auth;
mod config;
mod domain;
mod repositories;
mod router;
mod routes;
mod services;

pub use app_state::AppState;

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use weaviate::WeaviateClient;

use crate::domain::extraction::DefaultExtractor;
use crate::domain::services::{ResourceService, SearchConfig, SearchService};
use crate::domain::vector_store::{
    generator::OpenAiGenerator, VectorStore, WeaviateStoreConfig, WeaviateVectorStore,
};
use crate::domain::StatusChannelRegistry;
use crate::repositories::{PgOutboxRepository, PgResourceRepository};
use crate::services::messaging::{InProcessBus, MessageConsumer};
use crate::services::{IndexationProcessor, OutboxProcessor};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lore_api=debug,tower_http=info".into()),
        )
        .init();

    let settings = config::read_config().expect("Failed to read configuration");

    let db_pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_secs(5))
        .connect_lazy_with(settings.database.with_db());
    sqlx::migrate!()
        .run(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let generator = Arc::new(
        OpenAiGenerator::new(
            settings.generation.api_url.clone(),
            settings.generation.api_key.clone(),
            settings.generation.model.clone(),
            settings.generation.max_tokens,
        )
        .expect("Failed to create generator"),
    );
    let weaviate_client = WeaviateClient::new(
        settings.vector_store.url.clone(),
        settings.vector_store.api_key.clone(),
    );
    let vector_store: Arc<dyn VectorStore> = Arc::new(WeaviateVectorStore::new(
        weaviate_client,
        generator,
        WeaviateStoreConfig {
            class: settings.vector_store.class_name.clone(),
            chunk_words: settings.vector_store.chunk_words,
            chunk_overlap: settings.vector_store.chunk_overlap,
        },
    ));

    let status_channels = Arc::new(StatusChannelRegistry::new());
    let resource_service = Arc::new(ResourceService::new(
        Arc::new(PgResourceRepository::new(db_pool.clone())),
        vector_store.clone(),
        Arc::new(DefaultExtractor::new()),
        status_channels,
        Duration::from_secs(settings.indexing.timeout_secs),
    ));
    let search_service = Arc::new(SearchService::new(
        vector_store,
        SearchConfig {
            retrieval_limit: settings.search.retrieval_limit,
            chunk_capacity: settings.search.chunk_capacity,
        },
    ));

    let bus = Arc::new(InProcessBus::default());

    let outbox_processor = Arc::new(OutboxProcessor::new(
        Arc::new(PgOutboxRepository::new(db_pool.clone())),
        bus.clone(),
        settings.outbox.to_config(),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let outbox_task = {
        let outbox_processor = outbox_processor.clone();
        tokio::spawn(async move { outbox_processor.run(shutdown_rx).await })
    };

    let subscription = bus
        .subscribe(
            IndexationProcessor::topics(),
            Arc::new(IndexationProcessor::new(resource_service.clone())),
        )
        .await
        .expect("Failed to subscribe indexation processor");

    let app_state = AppState::new(db_pool, resource_service, search_service);
    let app = router::create(app_state, &settings);

    let address = format!(
        "{}:{}",
        settings.application.host, settings.application.port
    );
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .expect("Failed to bind listen address");
    tracing::info!("listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("shutting down background tasks");
    let _ = shutdown_tx.send(true);
    let _ = outbox_task.await;
    subscription.stop();
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
}
