use anyhow::Context;
use axum::Router;
use clap::Parser;
use media_search::backend::SearchBackend;
use media_search::backend::elasticsearch::ElasticsearchBackend;
use media_search::backend::memory::MemoryBackend;
use media_search::config::{BackendKind, ServerConfig};
use media_search::cursor::cache::CursorCache;
use media_search::search::coordinator::PaginationCoordinator;
use media_search::search::handlers::router;
use media_search::search::protocol::API_PREFIX;
use media_search::search::types::MediaItem;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::parse();
    tracing::info!("Starting media search on {}", config.bind);

    // 1. Search backend:
    let backend = build_backend(&config).await?;
    backend
        .check_connection()
        .await
        .context("search backend is not reachable")?;

    // 2. Cursor cache and coordinator:
    let cache = CursorCache::new(config.cursor_ttl());
    let coordinator = PaginationCoordinator::new(backend, cache.clone(), config.coordinator_settings());
    tracing::info!(
        "Cursor keep-alive {}, reuse margin {:?}",
        config.keep_alive,
        config.cursor_ttl()
    );

    // 3. HTTP Router:
    let app = Router::new().nest(API_PREFIX, router(coordinator));

    // 4. Spawn cache sweeper:
    let sweep_cache = cache.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));

        loop {
            interval.tick().await;
            let purged = sweep_cache.purge_expired();
            if purged > 0 {
                tracing::info!("Cursor cache: purged {} expired entries", purged);
            }
            tracing::debug!("Cursor cache: {} live entries", sweep_cache.len());
        }
    });

    // 5. Start HTTP server:
    tracing::info!("HTTP server listening on {}{}", config.bind, API_PREFIX);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn build_backend(config: &ServerConfig) -> anyhow::Result<Arc<dyn SearchBackend>> {
    match config.backend {
        BackendKind::Memory => {
            let documents = match &config.seed_file {
                Some(path) => {
                    let raw = tokio::fs::read_to_string(path)
                        .await
                        .with_context(|| format!("reading seed file {}", path.display()))?;
                    serde_json::from_str::<Vec<MediaItem>>(&raw)
                        .with_context(|| format!("parsing seed file {}", path.display()))?
                }
                None => Vec::new(),
            };
            tracing::info!("Memory backend with {} documents", documents.len());
            Ok(Arc::new(MemoryBackend::with_documents(documents)))
        }
        BackendKind::Elasticsearch => {
            let es = config.elasticsearch();
            tracing::info!("Elasticsearch backend at {} (index {})", es.url, es.index);
            Ok(Arc::new(ElasticsearchBackend::new(es)?))
        }
    }
}
