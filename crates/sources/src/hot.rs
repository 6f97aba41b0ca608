//! Hot recall: highest hot score among videos published in the last day.
//!
//! The ranked id list is shared by every viewer, so it is kept in the cache
//! as a sorted set under `keys::HOT_VIDEOS` and rebuilt from the store when
//! the entry is missing. Cache failures fall back to the store silently.
//! Videos resolved from a cached list are checked again, since one may have
//! been taken down or aged out after the list was built.

use crate::strategy::RecallStrategy;
use crate::types::{RecallRequest, RecallSource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use store::{keys, Cache, Video, VideoId, VideoOrder, VideoQuery, VideoStore};
use tracing::{debug, warn};

pub struct HotStrategy {
    store: Arc<dyn VideoStore>,
    cache: Arc<dyn Cache>,

    /// Publication window of the hot list
    window: chrono::Duration,

    /// Expiry of the cached hot list
    cache_ttl: Duration,

    /// Number of ids kept in the cached list
    pool_size: usize,
}

impl HotStrategy {
    pub fn new(store: Arc<dyn VideoStore>, cache: Arc<dyn Cache>) -> Self {
        Self {
            store,
            cache,
            window: chrono::Duration::hours(24),
            cache_ttl: Duration::from_secs(3600),
            pool_size: 500,
        }
    }

    /// Configure the cached list expiry (default: 1 hour)
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Configure how many ids the cached list holds (default: 500)
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Ids from the cached list, `None` on miss or cache error.
    async fn cached_ids(&self, quota: usize) -> Option<Vec<VideoId>> {
        match self.cache.zset_rev_range(keys::HOT_VIDEOS, quota).await {
            Ok(members) if !members.is_empty() => Some(
                members
                    .into_iter()
                    .filter_map(|(member, _)| member.parse().ok())
                    .collect(),
            ),
            Ok(_) => None,
            Err(e) => {
                warn!("Hot list cache read failed: {}", e);
                None
            }
        }
    }

    /// Rank the hot list from the store and write it back to the cache.
    async fn rebuild(&self) -> Result<Vec<Video>> {
        let since = Utc::now() - self.window;
        let query = VideoQuery::published(self.pool_size)
            .since(since)
            .order_by(VideoOrder::HotDesc);
        let videos = self
            .store
            .query_videos(&query)
            .await
            .context("Failed to query hot videos")?;

        let members: Vec<(String, f64)> = videos
            .iter()
            .map(|v| (v.id.to_string(), v.hot_score))
            .collect();
        if let Err(e) = self
            .cache
            .zset_replace(keys::HOT_VIDEOS, &members, self.cache_ttl)
            .await
        {
            warn!("Hot list cache write failed: {}", e);
        }
        debug!("Rebuilt hot list with {} videos", videos.len());
        Ok(videos)
    }
}

#[async_trait]
impl RecallStrategy for HotStrategy {
    fn source(&self) -> RecallSource {
        RecallSource::Hot
    }

    async fn recall(&self, _request: &RecallRequest, quota: usize) -> Result<Vec<Video>> {
        if let Some(ids) = self.cached_ids(quota).await {
            debug!("Hot list cache hit ({} ids)", ids.len());
            let since = Utc::now() - self.window;
            let videos = self
                .store
                .get_videos(&ids)
                .await
                .context("Failed to resolve cached hot ids")?;
            return Ok(videos
                .into_iter()
                .filter(|v| v.is_published() && v.published_at >= since)
                .collect());
        }

        let mut videos = self.rebuild().await?;
        videos.truncate(quota);
        Ok(videos)
    }
}
