//! The FilterPipeline orchestrates multiple filters.
//!
//! `FilterPipeline` chains synchronous filters using the builder pattern.
//! `FeedFilter` wraps the standard pipeline with the per-request work around
//! it: loading the viewer's history sets first, recording the survivors as
//! recommended afterwards.

use crate::filters::{AlreadyWatchedFilter, AuthorBlockFilter, CategoryCapFilter, QualityFilter};
use crate::history::HistoryStore;
use crate::ranker::ScoredCandidate;
use crate::traits::{Filter, FilterContext};
use anyhow::Result;
use std::sync::Arc;
use store::{UserId, VideoId};
use tracing::{debug, instrument};

/// Thresholds of the standard filters
#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    pub min_quality: f64,
    pub min_duration: u32,
    pub max_duration: u32,
    pub max_per_category: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_quality: 30.0,
            min_duration: 3,
            max_duration: 3600,
            max_per_category: 2,
        }
    }
}

impl FilterConfig {
    /// Configure the quality floor (default: 30)
    pub fn with_min_quality(mut self, min_quality: f64) -> Self {
        self.min_quality = min_quality;
        self
    }

    /// Configure the allowed duration range in seconds (default: 3..=3600)
    pub fn with_duration_range(mut self, min: u32, max: u32) -> Self {
        self.min_duration = min;
        self.max_duration = max;
        self
    }

    /// Configure the per-category cap (default: 2)
    pub fn with_max_per_category(mut self, max: usize) -> Self {
        self.max_per_category = max;
        self
    }
}

/// Chains multiple filters together into a processing pipeline.
///
/// ## Usage
/// ```ignore
/// let pipeline = FilterPipeline::new()
///     .add_filter(AlreadyWatchedFilter)
///     .add_filter(QualityFilter::new(30.0, 3, 3600))
///     .add_filter(CategoryCapFilter::new(2));
///
/// let filtered = pipeline.apply(candidates, &context)?;
/// ```
pub struct FilterPipeline {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterPipeline {
    /// Create a new empty FilterPipeline.
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// The feed filters in order: watched, quality, author block,
    /// category cap. The cap is stateful and must stay last.
    pub fn standard(config: &FilterConfig) -> Self {
        Self::new()
            .add_filter(AlreadyWatchedFilter)
            .add_filter(QualityFilter::new(
                config.min_quality,
                config.min_duration,
                config.max_duration,
            ))
            .add_filter(AuthorBlockFilter)
            .add_filter(CategoryCapFilter::new(config.max_per_category))
    }

    /// Add a filter to the pipeline (builder pattern).
    pub fn add_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Apply all filters in sequence to the candidates.
    pub fn apply(
        &self,
        candidates: Vec<ScoredCandidate>,
        context: &FilterContext,
    ) -> Result<Vec<ScoredCandidate>> {
        let mut current = candidates;
        for filter in &self.filters {
            debug!(
                "Applying filter: {} (input count: {})",
                filter.name(),
                current.len()
            );
            current = filter.apply(current, context)?;
            debug!(
                "Filter applied: {} (output count: {})",
                filter.name(),
                current.len()
            );
        }
        Ok(current)
    }
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Post-rank gate of the feed.
pub struct FeedFilter {
    pipeline: FilterPipeline,
    history: Arc<HistoryStore>,
}

impl FeedFilter {
    pub fn new(history: Arc<HistoryStore>, config: &FilterConfig) -> Self {
        Self {
            pipeline: FilterPipeline::standard(config),
            history,
        }
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Filter ranked candidates for a viewer, keeping their order.
    ///
    /// Fails only when the viewer's watch history can't be loaded. The
    /// survivors are logged as recommended for known viewers.
    #[instrument(skip(self, ranked), fields(viewer_id = ?viewer_id, candidates = ranked.len()))]
    pub async fn filter(
        &self,
        viewer_id: Option<UserId>,
        ranked: Vec<ScoredCandidate>,
    ) -> Result<Vec<ScoredCandidate>> {
        let context = match viewer_id {
            Some(user_id) => FilterContext {
                viewer_id,
                watched: self.history.watched(user_id).await?,
                blocked: self.history.blocked(user_id).await,
            },
            None => FilterContext::anonymous(),
        };

        let survivors = self.pipeline.apply(ranked, &context)?;

        if let Some(user_id) = viewer_id {
            let ids: Vec<VideoId> = survivors.iter().map(ScoredCandidate::id).collect();
            self.history.record_recommended(user_id, &ids).await;
        }
        Ok(survivors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use std::collections::HashSet;
    use store::{ActionType, BehaviorEvent, MemoryCache};

    #[test]
    fn test_empty_pipeline() {
        let pipeline = FilterPipeline::new();
        let candidates = vec![scored(1, 1), scored(2, 1)];
        let filtered = pipeline
            .apply(candidates, &FilterContext::anonymous())
            .unwrap();
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn test_standard_pipeline_output_is_subsequence() {
        let pipeline = FilterPipeline::standard(&FilterConfig::default());
        assert_eq!(pipeline.len(), 4);

        let mut context = FilterContext::for_viewer(1);
        context.watched.insert(2);
        let mut low = scored(4, 2);
        low.video.quality_score = 5.0;
        let candidates = vec![
            scored(1, 1),
            scored(2, 1),
            scored(3, 1),
            low,
            scored(5, 1),
            scored(6, 2),
        ];
        let input: Vec<VideoId> = candidates.iter().map(|c| c.id()).collect();

        let filtered = pipeline.apply(candidates, &context).unwrap();
        let ids: Vec<VideoId> = filtered.iter().map(|c| c.id()).collect();
        // 2 watched, 4 low quality, 5 is the third of category 1
        assert_eq!(ids, vec![1, 3, 6]);

        let mut rest = input.iter();
        assert!(ids.iter().all(|id| rest.any(|x| x == id)));
    }

    #[tokio::test]
    async fn test_feed_filter_excludes_watched_and_records() {
        let store = Arc::new(create_test_store());
        let cache = Arc::new(MemoryCache::new());
        for id in [3, 7] {
            store.add_behavior(BehaviorEvent::new(1, id, ActionType::View));
        }
        let history = Arc::new(HistoryStore::new(store, cache));
        let feed_filter = FeedFilter::new(
            history.clone(),
            &FilterConfig::default().with_max_per_category(10),
        );

        let ranked: Vec<ScoredCandidate> = (1..=10).map(|id| scored(id, 1)).collect();
        let filtered = feed_filter.filter(Some(1), ranked).await.unwrap();
        let ids: Vec<VideoId> = filtered.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![1, 2, 4, 5, 6, 8, 9, 10]);

        let recorded = history.recommended(1).await.unwrap();
        assert_eq!(recorded, ids.into_iter().collect::<HashSet<_>>());
    }

    #[tokio::test]
    async fn test_feed_filter_anonymous_viewer() {
        let store = Arc::new(create_test_store());
        store.inject_failure("behaviors_since");
        let history = Arc::new(HistoryStore::new(store, Arc::new(MemoryCache::new())));
        let feed_filter = FeedFilter::new(history, &FilterConfig::default());

        let filtered = feed_filter
            .filter(None, vec![scored(1, 1), scored(2, 2)])
            .await
            .unwrap();
        assert_eq!(filtered.len(), 2);
    }

    #[tokio::test]
    async fn test_feed_filter_fails_on_history_error() {
        let store = Arc::new(create_test_store());
        store.inject_failure("behaviors_since");
        let history = Arc::new(HistoryStore::new(store, Arc::new(MemoryCache::new())));
        let feed_filter = FeedFilter::new(history, &FilterConfig::default());

        assert!(feed_filter.filter(Some(1), vec![scored(1, 1)]).await.is_err());
    }

    #[tokio::test]
    async fn test_recording_failure_is_swallowed() {
        let cache = Arc::new(MemoryCache::new());
        let history = Arc::new(HistoryStore::new(Arc::new(create_test_store()), cache.clone()));
        let feed_filter = FeedFilter::new(history, &FilterConfig::default());

        cache.set_available(false);
        // watched set falls back to the store, recording fails quietly
        let filtered = feed_filter.filter(Some(1), vec![scored(1, 1)]).await.unwrap();
        assert_eq!(filtered.len(), 1);
    }
}
