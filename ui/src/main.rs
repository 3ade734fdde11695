use clap::Parser;
use media_search::client::fetch::PagedFetchLoop;
use media_search::client::mirror::CursorMirror;
use media_search::client::store::FileStore;
use media_search::client::transport::HttpTransport;
use media_search::client::types::{FetchOutcome, RetryPolicy};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Walks a media search page by page, resuming from the on-disk mirror.
#[derive(Debug, Parser)]
#[command(name = "media-search-ui")]
#[command(version)]
struct Args {
    /// Server root URL.
    #[arg(long, env = "NODE_URL", default_value = "http://127.0.0.1:3000")]
    node: String,

    #[arg(long, short, default_value = "")]
    query: String,

    /// Media type (`db`) filter.
    #[arg(long = "type")]
    type_filter: Option<String>,

    #[arg(long, default_value_t = 50)]
    limit: usize,

    /// Stop after this many pages.
    #[arg(long)]
    max_pages: Option<usize>,

    #[arg(long, env = "MEDIA_SEARCH_STATE", default_value = ".media-search-state.json")]
    state_file: PathBuf,

    #[arg(long, default_value_t = 60_000)]
    timeout_ms: u64,

    /// Retries per page when the node or its engine is unavailable.
    #[arg(long, default_value_t = 3)]
    retries: usize,

    /// Close the cursor on the server once the walk is done.
    #[arg(long)]
    close: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let transport = Arc::new(HttpTransport::new(
        &args.node,
        Duration::from_millis(args.timeout_ms),
    )?);
    let mirror = CursorMirror::with_default_ttl(Arc::new(FileStore::new(&args.state_file)));
    let walker = PagedFetchLoop::new(
        transport.clone(),
        mirror,
        &args.query,
        args.type_filter.as_deref(),
        args.limit,
    );

    tracing::info!("Walking '{}' on {}", args.query, transport.base_url());

    let retry_policy = RetryPolicy {
        max_retries: args.retries,
        ..RetryPolicy::default()
    };

    let mut pages = 0;
    let mut printed = 0;
    while args.max_pages.is_none_or(|max| pages < max) {
        let outcome = walker
            .fetch_next_retrying(&retry_policy, |e, retry, delay| {
                eprintln!(
                    "!! page request failed: {} (retry {}/{} in {:.1}s)",
                    e,
                    retry,
                    retry_policy.max_retries,
                    delay.as_secs_f32()
                );
            })
            .await;

        match outcome {
            Ok(FetchOutcome::Fetched { page, appended, reset }) => {
                pages += 1;
                if reset {
                    println!("-- cursor replaced by server, numbering restarts --");
                }
                println!("-- page {} ({} items) --", page, appended);

                let items = walker.items().await;
                for item in &items[printed..] {
                    println!(
                        "{:<12} {:<12} {:<4} {}",
                        item.bildnummer,
                        item.datum.as_deref().unwrap_or("-"),
                        item.db.as_deref().unwrap_or("-"),
                        item.suchtext.as_deref().unwrap_or("")
                    );
                }
                printed = items.len();
            }
            Ok(FetchOutcome::Exhausted) => break,
            Ok(FetchOutcome::InFlight) => continue,
            Err(e) => {
                eprintln!(
                    "!! page request failed: {}. {} items shown; run again to resume from the saved cursor",
                    e, printed
                );
                return Err(e.into());
            }
        }
    }

    println!(
        "{} items shown of {} ({})",
        printed,
        walker.total().await,
        if walker.has_more().await { "more available" } else { "complete" }
    );

    if args.close {
        if let Some(handle) = walker.continuation().await {
            transport.delete_pit(&handle.cursor_id).await?;
            walker.mirror().clear(&walker.signature().await);
            tracing::info!("Closed cursor {}", handle.cursor_id);
        }
    }

    Ok(())
}
