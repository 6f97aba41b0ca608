//! Test harness for the feed engine.
//!
//! Loads the seed data, builds the engine from `FEED_*` configuration and
//! serves the first feed page of a sample viewer.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use server::{EngineConfig, FeedEngine, FeedRequest};
use sources::Scene;
use store::{Cache, MemoryCache, MemoryStore, RedisCache};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting feed engine test harness");
    let config = EngineConfig::from_env()?;

    info!("Loading seed data from {}", config.data_dir.display());
    let store = Arc::new(
        MemoryStore::load_from_dir(&config.data_dir).context("Failed to load seed data")?,
    );
    let (users, videos, events) = store.counts();
    info!(
        "Loaded {} users, {} videos, {} behavior events",
        users, videos, events
    );

    let cache: Arc<dyn Cache> = match &config.redis_url {
        Some(url) => {
            info!("Connecting to Redis at {}", url);
            Arc::new(RedisCache::connect(url).await?)
        }
        None => Arc::new(MemoryCache::new()),
    };

    let viewer_id = store.user_ids().first().copied();
    let engine = FeedEngine::new(store, cache, config);

    let request = FeedRequest::new(viewer_id, Scene::Feed).with_page(1, 10);
    let page = engine.recommend(&request).await?;

    info!(
        "Page {} for viewer {:?}: {} of {} videos",
        page.page,
        viewer_id,
        page.items.len(),
        page.total
    );
    for (i, item) in page.items.iter().enumerate() {
        info!(
            "{}. [{}] {} - Score: {:.3} [{}]",
            i + 1,
            item.id(),
            item.video.title,
            item.score,
            item.source.as_str()
        );
    }

    engine.shutdown().await;
    Ok(())
}
