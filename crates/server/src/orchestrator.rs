//! # Feed Engine
//!
//! Coordinates one feed request through the pipeline:
//! 1. Validate the request and resolve the viewer
//! 2. Recall a candidate pool of `page_size * recall_multiplier` videos
//! 3. Extract viewer and video features
//! 4. Rank, then optionally apply the diversity pass
//! 5. Filter against the viewer's history and the quality rules
//! 6. Slice out the requested page
//!
//! Each request runs the pipeline once. A stage that degrades (a failed
//! recall strategy, a missing feature) shrinks its output; only a viewer
//! lookup failure or a filter failure aborts the request.
//!
//! Behavior events are persisted synchronously and handed to the interest
//! worker, which updates the viewer's category interests in the background.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use pipeline::{
    apply_diversity, DeadLetter, FeatureEngineer, FeedFilter, HistoryStore, InterestUpdater,
    Ranker, ScoredCandidate,
};
use sources::{RecallRequest, RecallStats, Recaller, Scene};
use store::{ActionType, BehaviorEvent, Cache, UserId, VideoId, VideoStore};

/// One page request.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedRequest {
    /// `None` for anonymous viewers
    pub viewer_id: Option<UserId>,
    pub scene: Scene,
    /// 1-based
    pub page: usize,
    pub page_size: usize,
}

impl FeedRequest {
    /// First page of 20 for `viewer_id` in `scene`.
    pub fn new(viewer_id: Option<UserId>, scene: Scene) -> Self {
        Self {
            viewer_id,
            scene,
            page: 1,
            page_size: 20,
        }
    }

    pub fn with_page(mut self, page: usize, page_size: usize) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }
}

/// One served page.
#[derive(Debug, Clone)]
pub struct FeedPage {
    pub items: Vec<ScoredCandidate>,
    /// Length of the filtered list the page was cut from
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub recall: RecallStats,
}

impl FeedPage {
    pub fn video_ids(&self) -> Vec<VideoId> {
        self.items.iter().map(ScoredCandidate::id).collect()
    }

    pub fn has_more(&self) -> bool {
        self.page.saturating_mul(self.page_size) < self.total
    }
}

/// The request-serving engine. Share it behind an `Arc`.
pub struct FeedEngine {
    store: Arc<dyn VideoStore>,
    recaller: Recaller,
    features: FeatureEngineer,
    ranker: Ranker,
    filter: FeedFilter,
    history: Arc<HistoryStore>,
    interests: InterestUpdater,
    config: EngineConfig,
}

impl FeedEngine {
    /// Wire every stage over a shared store and cache.
    ///
    /// Must be called inside a Tokio runtime: the interest worker is
    /// spawned here.
    pub fn new(store: Arc<dyn VideoStore>, cache: Arc<dyn Cache>, config: EngineConfig) -> Self {
        let recaller =
            Recaller::new(store.clone(), cache.clone()).with_config(config.recall_config());
        let features = FeatureEngineer::new(store.clone(), cache.clone())
            .with_config(config.feature_config());
        let history = Arc::new(HistoryStore::new(store.clone(), cache.clone()));
        let filter = FeedFilter::new(history.clone(), &config.filter_config());
        let interests = InterestUpdater::spawn(store.clone(), cache, config.interest_config());

        info!(
            "Feed engine ready (max page size {}, recall x{})",
            config.max_page_size, config.recall_multiplier
        );
        Self {
            store,
            recaller,
            features,
            ranker: Ranker::new(),
            filter,
            history,
            interests,
            config,
        }
    }

    pub fn with_ranker(mut self, ranker: Ranker) -> Self {
        self.ranker = ranker;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn features(&self) -> &FeatureEngineer {
        &self.features
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Serve one page of the feed.
    #[instrument(skip(self), fields(viewer_id = ?request.viewer_id, scene = %request.scene))]
    pub async fn recommend(&self, request: &FeedRequest) -> Result<FeedPage> {
        let start_time = Instant::now();
        self.validate(request)?;

        if let Some(viewer_id) = request.viewer_id {
            self.ensure_viewer(viewer_id).await?;
        }

        // Recall
        let stage_start = Instant::now();
        let limit = request
            .page_size
            .saturating_mul(self.config.recall_multiplier);
        let recall_request = RecallRequest::new(request.viewer_id, request.scene, limit);
        let (pool, recall) = self.recaller.recall_with_stats(&recall_request).await;
        info!(
            "Recall: {} candidates in {:.2?}",
            pool.len(),
            stage_start.elapsed()
        );

        // Features
        let stage_start = Instant::now();
        let features = self.features.extract(request.viewer_id, &pool).await;
        info!(
            "Features: viewer={}, videos={} in {:.2?}",
            features.user.is_some(),
            features.videos.len(),
            stage_start.elapsed()
        );

        // Rank
        let stage_start = Instant::now();
        let ranker = self.ranker.clone();
        let ranked = tokio::task::spawn_blocking(move || ranker.rank(pool, &features))
            .await
            .map_err(|e| EngineError::stage("rank", anyhow::Error::new(e)))?;
        let ranked = apply_diversity(ranked, self.config.ranker_diversity_ratio);
        info!(
            "Rank: {} candidates in {:.2?}",
            ranked.len(),
            stage_start.elapsed()
        );

        // Filter
        let stage_start = Instant::now();
        let filtered = self
            .filter
            .filter(request.viewer_id, ranked)
            .await
            .map_err(|e| EngineError::stage("filter", e))?;
        info!(
            "Filter: {} candidates remain in {:.2?}",
            filtered.len(),
            stage_start.elapsed()
        );

        let (items, total) = paginate(filtered, request.page, request.page_size);
        info!(
            "Served {} of {} for page {} in {:.2?}",
            items.len(),
            total,
            request.page,
            start_time.elapsed()
        );

        Ok(FeedPage {
            items,
            total,
            page: request.page,
            page_size: request.page_size,
            recall,
        })
    }

    /// Record a behavior event of `viewer_id`.
    ///
    /// The event is persisted before returning and the viewer's cached
    /// feature is dropped. The interest update runs in the background;
    /// a full queue dead-letters it without failing the call. A re-sent
    /// event id is stored once.
    #[instrument(skip(self, event), fields(event_id = %event.id, action = event.action.as_str()))]
    pub async fn update_user_profile(&self, viewer_id: UserId, event: BehaviorEvent) -> Result<()> {
        if event.user_id != viewer_id {
            return Err(EngineError::InvalidRequest(format!(
                "event belongs to user {}, not viewer {}",
                event.user_id, viewer_id
            )));
        }

        self.ensure_viewer(viewer_id).await?;

        if !self.store.insert_behavior(&event).await? {
            debug!("Event {} of viewer {} already stored", event.id, viewer_id);
        }
        self.features.evict_user(viewer_id).await;
        if event.action == ActionType::View {
            self.history.evict_watched(viewer_id).await;
        }

        if !self.interests.enqueue(event) {
            warn!("Interest update for viewer {} was not queued", viewer_id);
        }
        Ok(())
    }

    async fn ensure_viewer(&self, viewer_id: UserId) -> Result<()> {
        self.store.get_user(viewer_id).await.map_err(|e| {
            if e.is_not_found() {
                EngineError::ViewerNotFound(viewer_id)
            } else {
                EngineError::Store(e)
            }
        })?;
        Ok(())
    }

    /// Drop the cached feature of a video after its counters changed.
    pub async fn update_video_feature(&self, video_id: VideoId) -> Result<()> {
        self.store.get_video(video_id).await.map_err(|e| {
            if e.is_not_found() {
                EngineError::VideoNotFound(video_id)
            } else {
                EngineError::Store(e)
            }
        })?;
        self.features.evict_video(video_id).await;
        Ok(())
    }

    pub async fn block_author(&self, viewer_id: UserId, author_id: UserId) -> Result<()> {
        self.history
            .block_author(viewer_id, author_id)
            .await
            .map_err(|e| EngineError::stage("history", e))
    }

    pub async fn unblock_author(&self, viewer_id: UserId, author_id: UserId) -> Result<()> {
        self.history
            .unblock_author(viewer_id, author_id)
            .await
            .map_err(|e| EngineError::stage("history", e))
    }

    /// Wait for every queued interest update to be handled.
    pub async fn flush_interests(&self) {
        self.interests.flush().await;
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.interests.dead_letters()
    }

    /// Drain the interest queue and stop its worker.
    pub async fn shutdown(&self) {
        self.interests.shutdown().await;
        info!("Feed engine stopped");
    }

    fn validate(&self, request: &FeedRequest) -> Result<()> {
        if request.page == 0 {
            return Err(EngineError::InvalidRequest(
                "page starts at 1".to_string(),
            ));
        }
        if request.page_size == 0 || request.page_size > self.config.max_page_size {
            return Err(EngineError::InvalidRequest(format!(
                "page size must be within 1..={}, got {}",
                self.config.max_page_size, request.page_size
            )));
        }
        Ok(())
    }
}

/// Cut page `page` (1-based) of `page_size` out of `items`.
///
/// Returns the page and the length of `items`. A page starting past the
/// end is empty.
pub fn paginate<T>(items: Vec<T>, page: usize, page_size: usize) -> (Vec<T>, usize) {
    let total = items.len();
    let start = page.saturating_sub(1).saturating_mul(page_size);
    if start >= total {
        return (Vec::new(), total);
    }
    let items = items.into_iter().skip(start).take(page_size).collect();
    (items, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use std::collections::{HashMap, HashSet};
    use store::{
        CategoryId, Gender, MemoryCache, MemoryStore, UserProfile, Video, VideoStatus,
    };

    // ============================================================================
    // Test Fixtures
    // ============================================================================

    /// Three viewers and 30 fresh videos over five categories.
    fn build_test_store() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        let now = Utc::now();

        for id in 1..=3 {
            store.add_user(UserProfile {
                id,
                nickname: format!("viewer{}", id),
                gender: Gender::Male,
                province: "Sichuan".to_string(),
                city: "Chengdu".to_string(),
                birth_year: Some(1998),
            });
        }

        for id in 1..=30u64 {
            store.add_video(Video {
                id,
                owner_id: 500 + id % 4,
                category_id: (id % 5) as CategoryId + 1,
                title: format!("short {}", id),
                tags: vec![],
                published_at: now - Duration::minutes(10 * id as i64),
                duration: 30,
                status: VideoStatus::Published,
                quality_score: 60.0,
                hot_score: (id * 10) as f64,
                play_count: 200,
                like_count: 20,
                comment_count: 4,
                share_count: 2,
            });
        }

        Arc::new(store)
    }

    fn build_test_engine() -> (FeedEngine, Arc<MemoryStore>) {
        let store = build_test_store();
        let engine = FeedEngine::new(
            store.clone(),
            Arc::new(MemoryCache::new()),
            EngineConfig::default(),
        );
        (engine, store)
    }

    // ============================================================================
    // Unit Tests: paginate
    // ============================================================================

    #[test]
    fn test_paginate_past_end() {
        let items: Vec<u32> = (0..15).collect();
        let (page, total) = paginate(items, 2, 20);
        assert!(page.is_empty());
        assert_eq!(total, 15);
    }

    #[test]
    fn test_paginate_exact_fit() {
        let items: Vec<u32> = (0..15).collect();
        let (page, total) = paginate(items, 1, 20);
        assert_eq!(page.len(), 15);
        assert_eq!(total, 15);
    }

    #[test]
    fn test_paginate_partial_last_page() {
        let items: Vec<u32> = (0..15).collect();
        let (page, total) = paginate(items, 2, 10);
        assert_eq!(page, vec![10, 11, 12, 13, 14]);
        assert_eq!(total, 15);

        let (page, _) = paginate((0..15).collect::<Vec<u32>>(), usize::MAX, usize::MAX);
        assert!(page.is_empty());
    }

    // ============================================================================
    // Unit Tests: recommend
    // ============================================================================

    #[tokio::test]
    async fn test_invalid_requests_rejected() {
        let (engine, _) = build_test_engine();

        for request in [
            FeedRequest::new(Some(1), Scene::Feed).with_page(0, 10),
            FeedRequest::new(Some(1), Scene::Feed).with_page(1, 0),
            FeedRequest::new(Some(1), Scene::Feed).with_page(1, 51),
        ] {
            let result = engine.recommend(&request).await;
            assert!(
                matches!(result, Err(EngineError::InvalidRequest(_))),
                "{:?} should be rejected",
                request
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_viewer() {
        let (engine, _) = build_test_engine();
        let result = engine.recommend(&FeedRequest::new(Some(99), Scene::Feed)).await;
        assert!(matches!(result, Err(EngineError::ViewerNotFound(99))));
    }

    #[tokio::test]
    async fn test_cold_start_viewer_gets_a_page() {
        let (engine, _) = build_test_engine();
        let page = engine
            .recommend(&FeedRequest::new(Some(1), Scene::Feed).with_page(1, 5))
            .await
            .unwrap();

        // All 30 videos are recalled; the category cap keeps two of each of
        // the five categories
        assert_eq!(page.total, 10);
        assert_eq!(page.items.len(), 5);
        assert!(page.has_more());
        assert!(page.recall.failed.is_empty());
        assert!(page.items.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_pagination_through_engine() {
        let (engine, _) = build_test_engine();

        let first = engine
            .recommend(&FeedRequest::new(None, Scene::Feed).with_page(2, 5))
            .await
            .unwrap();
        assert_eq!(first.items.len(), 5);
        assert!(!first.has_more());

        let past_end = engine
            .recommend(&FeedRequest::new(None, Scene::Feed).with_page(3, 5))
            .await
            .unwrap();
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total, 10);
    }

    #[tokio::test]
    async fn test_no_category_more_than_twice() {
        let (engine, _) = build_test_engine();
        let page = engine
            .recommend(&FeedRequest::new(Some(2), Scene::Feed).with_page(1, 20))
            .await
            .unwrap();

        let mut per_category: HashMap<CategoryId, usize> = HashMap::new();
        for item in &page.items {
            *per_category.entry(item.video.category_id).or_insert(0) += 1;
        }
        assert!(per_category.values().all(|count| *count <= 2));
    }

    #[tokio::test]
    async fn test_watched_video_excluded_after_view() {
        let (engine, _) = build_test_engine();
        let request = FeedRequest::new(Some(1), Scene::Feed).with_page(1, 20);

        let before = engine.recommend(&request).await.unwrap();
        let watched = before.items[0].id();

        let event = BehaviorEvent::new(1, watched, ActionType::View).with_watch(30.0, 1.0);
        engine.update_user_profile(1, event).await.unwrap();

        let after = engine.recommend(&request).await.unwrap();
        assert!(!after.video_ids().contains(&watched));
    }

    #[tokio::test]
    async fn test_filter_failure_aborts_request() {
        let (engine, store) = build_test_engine();
        store.inject_failure("behaviors_since");

        let result = engine.recommend(&FeedRequest::new(Some(1), Scene::Feed)).await;
        assert!(matches!(
            result,
            Err(EngineError::Stage { stage: "filter", .. })
        ));

        // Anonymous viewers have no history to load
        let anonymous = engine.recommend(&FeedRequest::new(None, Scene::Feed)).await;
        assert!(anonymous.is_ok());
    }

    // ============================================================================
    // Unit Tests: feedback
    // ============================================================================

    #[tokio::test]
    async fn test_event_of_other_user_rejected() {
        let (engine, _) = build_test_engine();
        let event = BehaviorEvent::new(2, 5, ActionType::Like);
        let result = engine.update_user_profile(1, event).await;
        assert!(matches!(result, Err(EngineError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_duplicate_event_applied_once() {
        let (engine, store) = build_test_engine();
        let event = BehaviorEvent::new(3, 4, ActionType::View).with_watch(15.0, 0.5);
        let category = store.get_video(4).await.unwrap().category_id;

        engine.update_user_profile(3, event.clone()).await.unwrap();
        engine.update_user_profile(3, event).await.unwrap();
        engine.flush_interests().await;

        let record = store.get_interest(3, category).await.unwrap().unwrap();
        assert_eq!(record.view_count, 1);
        assert!((record.score - 0.05).abs() < 1e-9);
        assert!(engine.dead_letters().is_empty());

        let stored = store
            .behaviors_since(3, DateTime::<Utc>::UNIX_EPOCH)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_event_of_unknown_viewer_rejected() {
        let (engine, store) = build_test_engine();
        let (_, _, events_before) = store.counts();

        let event = BehaviorEvent::new(99, 5, ActionType::Like);
        let result = engine.update_user_profile(99, event).await;
        assert!(matches!(result, Err(EngineError::ViewerNotFound(99))));

        engine.flush_interests().await;
        assert_eq!(store.counts().2, events_before);
        assert!(engine.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_learned_interest_reaches_user_feature() {
        let (engine, store) = build_test_engine();
        let category = store.get_video(7).await.unwrap().category_id;

        // Warm the cached feature first
        let cold = engine.features().user_feature(2).await.unwrap();
        assert!(cold.interest(category).is_none());

        let event = BehaviorEvent::new(2, 7, ActionType::Share);
        engine.update_user_profile(2, event).await.unwrap();
        engine.flush_interests().await;

        let warm = engine.features().user_feature(2).await.unwrap();
        assert!(warm.interest(category).unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_update_video_feature() {
        let (engine, _) = build_test_engine();
        assert!(engine.update_video_feature(3).await.is_ok());
        assert!(matches!(
            engine.update_video_feature(404).await,
            Err(EngineError::VideoNotFound(404))
        ));
    }

    #[tokio::test]
    async fn test_blocked_author_not_served() {
        let (engine, _) = build_test_engine();
        engine.block_author(1, 501).await.unwrap();

        let page = engine
            .recommend(&FeedRequest::new(Some(1), Scene::Feed).with_page(1, 20))
            .await
            .unwrap();
        let owners: HashSet<UserId> = page.items.iter().map(|c| c.video.owner_id).collect();
        assert!(!owners.contains(&501));

        engine.unblock_author(1, 501).await.unwrap();
        assert!(engine.history().blocked(1).await.is_empty());
    }
}
