//! Per-viewer history sets kept in the cache.
//!
//! - watched:     cache-aside over the last 7 days of view events, TTL 7d
//! - blocked:     cache only; a missing or unreachable set blocks nobody
//! - recommended: append-only log of served videos, TTL 24h

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashSet;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use store::{keys, ActionType, Cache, UserId, VideoId, VideoStore};
use tracing::{debug, warn};

const WATCHED_TTL: Duration = Duration::from_secs(7 * 24 * 3600);
const RECOMMENDED_TTL: Duration = Duration::from_secs(24 * 3600);
const WATCHED_LOOKBACK_DAYS: i64 = 7;

fn to_members<T: ToString>(ids: &[T]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

fn parse_members<T: FromStr + Eq + Hash>(members: Vec<String>) -> HashSet<T> {
    members.into_iter().filter_map(|m| m.parse().ok()).collect()
}

pub struct HistoryStore {
    store: Arc<dyn VideoStore>,
    cache: Arc<dyn Cache>,
}

impl HistoryStore {
    pub fn new(store: Arc<dyn VideoStore>, cache: Arc<dyn Cache>) -> Self {
        Self { store, cache }
    }

    /// Videos the viewer watched in the last 7 days.
    ///
    /// Served from the cache when present. Otherwise rebuilt from the
    /// store, whose failure is returned to the caller.
    pub async fn watched(&self, user_id: UserId) -> Result<HashSet<VideoId>> {
        let key = keys::watched(user_id);
        match self.cache.exists(&key).await {
            Ok(true) => match self.cache.set_members(&key).await {
                Ok(members) => return Ok(parse_members(members)),
                Err(e) => warn!("Watched set read for {} failed: {}", user_id, e),
            },
            Ok(false) => {}
            Err(e) => warn!("Watched set lookup for {} failed: {}", user_id, e),
        }

        let since = Utc::now() - ChronoDuration::days(WATCHED_LOOKBACK_DAYS);
        let watched: Vec<VideoId> = self
            .store
            .behaviors_since(user_id, since)
            .await
            .with_context(|| format!("Failed to load watch history of user {}", user_id))?
            .into_iter()
            .filter(|e| e.action == ActionType::View)
            .map(|e| e.video_id)
            .collect();
        debug!("Rebuilt watched set of {} ({} views)", user_id, watched.len());

        if !watched.is_empty() {
            self.add_with_ttl(&key, &to_members(&watched), WATCHED_TTL).await;
        }
        Ok(watched.into_iter().collect())
    }

    /// Drop the cached watched set so the next read rebuilds it.
    pub async fn evict_watched(&self, user_id: UserId) {
        if let Err(e) = self.cache.delete(&keys::watched(user_id)).await {
            warn!("Watched set eviction for {} failed: {}", user_id, e);
        }
    }

    /// Authors the viewer blocked; empty when the cache can't say.
    pub async fn blocked(&self, user_id: UserId) -> HashSet<UserId> {
        match self.cache.set_members(&keys::blocked(user_id)).await {
            Ok(members) => parse_members(members),
            Err(e) => {
                warn!("Block list read for {} failed: {}", user_id, e);
                HashSet::new()
            }
        }
    }

    pub async fn block_author(&self, user_id: UserId, author_id: UserId) -> Result<()> {
        self.cache
            .set_add(&keys::blocked(user_id), &to_members(&[author_id]))
            .await
            .context("Failed to update block list")
    }

    pub async fn unblock_author(&self, user_id: UserId, author_id: UserId) -> Result<()> {
        self.cache
            .set_remove(&keys::blocked(user_id), &to_members(&[author_id]))
            .await
            .context("Failed to update block list")
    }

    /// Log served videos; failures are only logged.
    pub async fn record_recommended(&self, user_id: UserId, video_ids: &[VideoId]) {
        if video_ids.is_empty() {
            return;
        }
        self.add_with_ttl(&keys::recommended(user_id), &to_members(video_ids), RECOMMENDED_TTL)
            .await;
    }

    /// Videos served to the viewer in the last 24 hours.
    pub async fn recommended(&self, user_id: UserId) -> Result<HashSet<VideoId>> {
        let members = self
            .cache
            .set_members(&keys::recommended(user_id))
            .await
            .context("Failed to read recommendation log")?;
        Ok(parse_members(members))
    }

    async fn add_with_ttl(&self, key: &str, members: &[String], ttl: Duration) {
        if let Err(e) = self.cache.set_add(key, members).await {
            warn!("Cache write of {} failed: {}", key, e);
            return;
        }
        if let Err(e) = self.cache.expire(key, ttl).await {
            warn!("Setting expiry of {} failed: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use store::{BehaviorEvent, MemoryCache, MemoryStore};

    fn history(store: Arc<MemoryStore>, cache: Arc<MemoryCache>) -> HistoryStore {
        HistoryStore::new(store, cache)
    }

    #[tokio::test]
    async fn test_watched_set_rebuilt_from_views_then_cached() {
        let store = Arc::new(create_test_store());
        store.add_behavior(BehaviorEvent::new(1, 3, ActionType::View));
        store.add_behavior(BehaviorEvent::new(1, 4, ActionType::Like));
        store.add_behavior(
            BehaviorEvent::new(1, 5, ActionType::View).at(Utc::now() - ChronoDuration::days(8)),
        );
        let cache = Arc::new(MemoryCache::new());
        let history = history(store.clone(), cache.clone());

        let watched = history.watched(1).await.unwrap();
        assert_eq!(watched, HashSet::from([3]));
        assert!(cache.exists(&keys::watched(1)).await.unwrap());

        store.inject_failure("behaviors_since");
        assert_eq!(history.watched(1).await.unwrap(), HashSet::from([3]));
    }

    #[tokio::test]
    async fn test_watched_store_failure_surfaces() {
        let store = Arc::new(create_test_store());
        store.inject_failure("behaviors_since");
        let history = history(store, Arc::new(MemoryCache::new()));
        assert!(history.watched(1).await.is_err());
    }

    #[tokio::test]
    async fn test_block_and_unblock() {
        let history = history(Arc::new(create_test_store()), Arc::new(MemoryCache::new()));
        history.block_author(1, 42).await.unwrap();
        history.block_author(1, 43).await.unwrap();
        assert_eq!(history.blocked(1).await, HashSet::from([42, 43]));

        history.unblock_author(1, 42).await.unwrap();
        assert_eq!(history.blocked(1).await, HashSet::from([43]));
    }

    #[tokio::test]
    async fn test_blocked_is_empty_when_cache_down() {
        let cache = Arc::new(MemoryCache::new());
        let history = history(Arc::new(create_test_store()), cache.clone());
        history.block_author(1, 42).await.unwrap();

        cache.set_available(false);
        assert!(history.blocked(1).await.is_empty());
    }

    #[tokio::test]
    async fn test_record_recommended() {
        let history = history(Arc::new(create_test_store()), Arc::new(MemoryCache::new()));
        history.record_recommended(1, &[7, 8]).await;
        history.record_recommended(1, &[8, 9]).await;
        assert_eq!(history.recommended(1).await.unwrap(), HashSet::from([7, 8, 9]));
    }
}
