//! Example: Recall a candidate pool for a viewer
//!
//! Run with: cargo run --package sources --example recall_pool -- [viewer_id]
//!
//! Loads the seed directory, runs every recall strategy and prints the
//! per-source breakdown of the merged pool.

use sources::{RecallRequest, Recaller, Scene};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use store::{MemoryCache, MemoryStore, VideoStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let viewer_id: u64 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(1);

    println!("=== Feed Recall Example ===\n");

    let start = Instant::now();
    let store = Arc::new(MemoryStore::load_from_dir(Path::new("data/seed"))?);
    println!("Loaded seed data in {:?}", start.elapsed());

    let viewer = store.get_user(viewer_id).await?;
    println!("Viewer: {} ({})\n", viewer.id, viewer.nickname);

    let recaller = Recaller::new(store.clone(), Arc::new(MemoryCache::new()));
    for scene in [Scene::Feed, Scene::Follow] {
        let request = RecallRequest::new(Some(viewer_id), scene, 100);
        let start = Instant::now();
        let (pool, stats) = recaller.recall_with_stats(&request).await;
        let elapsed = start.elapsed();

        println!("Scene {}: {} candidates in {:?}", scene, pool.len(), elapsed);
        let mut sources: Vec<_> = stats.per_source.iter().collect();
        sources.sort_by_key(|(source, _)| source.as_str());
        for (source, count) in sources {
            println!("  {:<14} {}", source.as_str(), count);
        }
        if !stats.failed.is_empty() {
            println!("  failed: {:?}", stats.failed);
        }

        println!("  Top 5:");
        for (i, candidate) in pool.iter().take(5).enumerate() {
            println!(
                "    {}. [{}] {} (hot {:.0})",
                i + 1,
                candidate.source.as_str(),
                candidate.video.title,
                candidate.video.hot_score
            );
        }
        println!();
    }

    Ok(())
}
