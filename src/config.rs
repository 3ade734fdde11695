//! Server configuration, from command-line flags with environment fallbacks.

use crate::backend::elasticsearch::ElasticsearchConfig;
use crate::backend::types::KeepAlive;
use crate::search::coordinator::CoordinatorSettings;

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// In-process point-in-time engine, optionally seeded from a file.
    Memory,
    Elasticsearch,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "media-search")]
#[command(about = "Media keyword search with stable deep pagination", long_about = None)]
#[command(version)]
pub struct ServerConfig {
    /// Address the HTTP server listens on.
    #[arg(long, env = "MEDIA_SEARCH_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    #[arg(long, env = "MEDIA_SEARCH_BACKEND", value_enum, default_value_t = BackendKind::Memory)]
    pub backend: BackendKind,

    #[arg(long, env = "ES_URL", default_value = "http://localhost:9200")]
    pub es_url: String,

    #[arg(long, env = "ES_USER")]
    pub es_user: Option<String>,

    #[arg(long, env = "ES_PASSWORD", hide_env_values = true)]
    pub es_password: Option<String>,

    #[arg(long, env = "ES_INDEX", default_value = "media")]
    pub es_index: String,

    #[arg(long, env = "ES_TIMEOUT_MS", default_value_t = 60_000)]
    pub es_timeout_ms: u64,

    #[arg(long, env = "ES_MAX_RETRIES", default_value_t = 5)]
    pub es_max_retries: usize,

    /// Engine keep-alive for cursors (e.g. `30s`, `5m`).
    #[arg(long, env = "MEDIA_SEARCH_KEEP_ALIVE", default_value = "5m")]
    pub keep_alive: KeepAlive,

    /// Age after which a cached cursor is no longer reused.
    #[arg(long, env = "MEDIA_SEARCH_CURSOR_TTL_SECS", default_value_t = 240)]
    pub cursor_ttl_secs: u64,

    #[arg(long, default_value_t = 50)]
    pub default_limit: usize,

    #[arg(long, default_value_t = 500)]
    pub max_limit: usize,

    /// JSON array of media documents loaded into the memory backend.
    #[arg(long, env = "MEDIA_SEARCH_SEED_FILE")]
    pub seed_file: Option<PathBuf>,
}

impl ServerConfig {
    pub fn cursor_ttl(&self) -> Duration {
        Duration::from_secs(self.cursor_ttl_secs)
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            keep_alive: self.keep_alive,
            default_limit: self.default_limit.clamp(1, self.max_limit.max(1)),
            max_limit: self.max_limit.max(1),
        }
    }

    pub fn elasticsearch(&self) -> ElasticsearchConfig {
        ElasticsearchConfig {
            url: self.es_url.trim_end_matches('/').to_string(),
            username: self.es_user.clone(),
            password: self.es_password.clone(),
            index: self.es_index.clone(),
            keep_alive: self.keep_alive,
            request_timeout: Duration::from_millis(self.es_timeout_ms),
            max_retries: self.es_max_retries,
        }
    }
}
