use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use serde_with::serde_as;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use strum::{Display, EnumString};

use crate::services::OutboxConfig;

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub vector_store: VectorStoreSettings,
    pub generation: GenerationSettings,
    #[serde(default)]
    pub outbox: OutboxSettings,
    #[serde(default)]
    pub indexing: IndexingSettings,
    #[serde(default)]
    pub search: SearchSettings,
}

#[serde_as]
#[derive(Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub port: u16,
    pub host: String,
    pub app_url: String,
}

#[serde_as]
#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub port: u16,
    pub host: String,
    pub database_name: String,
    pub require_ssl: bool,
}

#[derive(Deserialize, Clone)]
pub struct VectorStoreSettings {
    pub url: String,
    pub api_key: Option<String>,
    pub class_name: String,
    #[serde(default = "default_chunk_words")]
    pub chunk_words: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_chunk_words() -> usize {
    200
}

fn default_chunk_overlap() -> usize {
    30
}

#[derive(Deserialize, Clone)]
pub struct GenerationSettings {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

fn default_max_tokens() -> usize {
    1024
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct OutboxSettings {
    pub interval_secs: u64,
    pub batch_size: i64,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for OutboxSettings {
    fn default() -> Self {
        let config = OutboxConfig::default();
        Self {
            interval_secs: config.interval.as_secs(),
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            retry_delay_secs: config.retry_delay.as_secs(),
        }
    }
}

impl OutboxSettings {
    pub fn to_config(&self) -> OutboxConfig {
        OutboxConfig {
            interval: Duration::from_secs(self.interval_secs),
            batch_size: self.batch_size,
            max_retries: self.max_retries,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
        }
    }
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct IndexingSettings {
    pub timeout_secs: u64,
}

impl Default for IndexingSettings {
    fn default() -> Self {
        Self { timeout_secs: 300 }
    }
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct SearchSettings {
    pub retrieval_limit: usize,
    pub chunk_capacity: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            retrieval_limit: 5,
            chunk_capacity: 32,
        }
    }
}

impl DatabaseSettings {
    pub fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };

        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .ssl_mode(ssl_mode)
    }

    pub fn with_db(&self) -> PgConnectOptions {
        self.without_db().database(&self.database_name)
    }
}

pub fn read_config() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let config_directory = base_path.join("config");

    let environment = Environment::from_str(
        std::env::var("APP_ENVIRONMENT")
            .unwrap_or_else(|_| "local".into())
            .as_str(),
    )
    .expect("Failed to parse APP_ENVIRONMENT");
    let environment_filename = format!("{}.yaml", environment);

    let settings = config::Config::builder()
        .add_source(config::File::from(config_directory.join("base.yaml")))
        .add_source(config::File::from(
            config_directory.join(environment_filename),
        ))
        .add_source(
            config::Environment::with_prefix("LORE")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

#[derive(Display, Debug, EnumString)]
pub enum Environment {
    #[strum(ascii_case_insensitive, serialize = "local")]
    Local,
    #[strum(ascii_case_insensitive, serialize = "production")]
    Production,
}
