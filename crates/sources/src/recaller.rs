//! Recaller: fan the request out to every applicable strategy, then merge.
//!
//! ## Algorithm
//! 1. Run all applicable strategies concurrently under one shared deadline
//! 2. Drop the output of any strategy that errors or misses the deadline
//! 3. Merge in strategy order, keeping the first occurrence of each video
//! 4. If the pool is still short of `limit`, fill the gap with random
//!    published videos not already pooled

use crate::collaborative::CollaborativeStrategy;
use crate::content::ContentStrategy;
use crate::follow::FollowStrategy;
use crate::hot::HotStrategy;
use crate::new_video::NewVideoStrategy;
use crate::strategy::RecallStrategy;
use crate::types::{Candidate, RecallRequest, RecallSource, RecallStats};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use store::{Cache, Video, VideoId, VideoOrder, VideoQuery, VideoStore};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

/// Recaller tunables
#[derive(Debug, Clone, PartialEq)]
pub struct RecallConfig {
    /// Shared deadline for the whole fan-out, random fill included
    pub timeout: Duration,

    /// Top up a short pool with random published videos
    pub random_fill: bool,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(800),
            random_fill: true,
        }
    }
}

impl RecallConfig {
    /// Configure the recall deadline (default: 800ms)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable the random fallback (default: enabled)
    pub fn with_random_fill(mut self, enabled: bool) -> Self {
        self.random_fill = enabled;
        self
    }
}

pub struct Recaller {
    store: Arc<dyn VideoStore>,
    strategies: Vec<Box<dyn RecallStrategy>>,
    config: RecallConfig,
}

impl Recaller {
    /// Recaller with the standard strategy set, in merge order:
    /// collaborative, content, hot, follow, new.
    pub fn new(store: Arc<dyn VideoStore>, cache: Arc<dyn Cache>) -> Self {
        let strategies: Vec<Box<dyn RecallStrategy>> = vec![
            Box::new(CollaborativeStrategy::new(store.clone())),
            Box::new(ContentStrategy::new(store.clone())),
            Box::new(HotStrategy::new(store.clone(), cache)),
            Box::new(FollowStrategy::new(store.clone())),
            Box::new(NewVideoStrategy::new(store.clone())),
        ];
        Self::with_strategies(store, strategies)
    }

    /// Recaller over a custom strategy list, merged in the given order.
    pub fn with_strategies(
        store: Arc<dyn VideoStore>,
        strategies: Vec<Box<dyn RecallStrategy>>,
    ) -> Self {
        Self {
            store,
            strategies,
            config: RecallConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RecallConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RecallConfig {
        &self.config
    }

    /// Build the candidate pool. Never fails: a broken strategy only
    /// shrinks the pool.
    pub async fn recall(&self, request: &RecallRequest) -> Vec<Candidate> {
        self.recall_with_stats(request).await.0
    }

    #[instrument(skip(self, request), fields(viewer_id = ?request.viewer_id, scene = %request.scene))]
    pub async fn recall_with_stats(&self, request: &RecallRequest) -> (Vec<Candidate>, RecallStats) {
        let deadline = Instant::now() + self.config.timeout;
        let mut stats = RecallStats::default();

        let active: Vec<&dyn RecallStrategy> = self
            .strategies
            .iter()
            .map(|s| s.as_ref())
            .filter(|s| s.applies_to(request))
            .collect();
        debug!("Running {} recall strategies", active.len());

        let outcomes = join_all(active.iter().map(|strategy| async move {
            let quota = strategy.quota(request.limit);
            let outcome = timeout_at(deadline, strategy.recall(request, quota)).await;
            (strategy.source(), outcome)
        }))
        .await;

        let mut batches: Vec<(RecallSource, Vec<Video>)> = Vec::with_capacity(outcomes.len() + 1);
        for (source, outcome) in outcomes {
            match outcome {
                Ok(Ok(videos)) => {
                    stats.per_source.insert(source, videos.len());
                    batches.push((source, videos));
                }
                Ok(Err(e)) => {
                    warn!("Recall strategy {} failed: {:#}", source.as_str(), e);
                    stats.failed.push(source);
                }
                Err(_) => {
                    warn!("Recall strategy {} timed out", source.as_str());
                    stats.failed.push(source);
                }
            }
        }

        let mut pool = merge(batches);

        if self.config.random_fill && pool.len() < request.limit {
            let filled = self.random_fill(&pool, request.limit - pool.len(), deadline).await;
            let filled = merge_into(&pool, filled);
            stats.per_source.insert(RecallSource::Random, filled.len());
            pool.extend(filled);
        }

        stats.total = pool.len();
        info!(
            "Recalled {} candidates (target {}, failed strategies: {})",
            stats.total,
            request.limit,
            stats.failed.len()
        );
        (pool, stats)
    }

    /// Random published videos not already in `pool`.
    async fn random_fill(&self, pool: &[Candidate], shortfall: usize, deadline: Instant) -> Vec<Video> {
        let exclude: Vec<VideoId> = pool.iter().map(Candidate::id).collect();
        let query = VideoQuery::published(shortfall)
            .excluding(exclude)
            .order_by(VideoOrder::Random);

        match timeout_at(deadline, self.store.query_videos(&query)).await {
            Ok(Ok(videos)) => videos,
            Ok(Err(e)) => {
                warn!("Random fill failed: {}", e);
                Vec::new()
            }
            Err(_) => {
                warn!("Random fill timed out");
                Vec::new()
            }
        }
    }
}

/// Insertion-ordered union of the batches, first occurrence wins.
fn merge(batches: Vec<(RecallSource, Vec<Video>)>) -> Vec<Candidate> {
    let mut seen: HashSet<VideoId> = HashSet::new();
    let mut pool = Vec::new();
    for (source, videos) in batches {
        for video in videos {
            if seen.insert(video.id) {
                pool.push(Candidate::new(video, source));
            }
        }
    }
    pool
}

/// Random-fill videos that are not yet pooled, as candidates.
fn merge_into(pool: &[Candidate], videos: Vec<Video>) -> Vec<Candidate> {
    let mut seen: HashSet<VideoId> = pool.iter().map(Candidate::id).collect();
    videos
        .into_iter()
        .filter(|v| seen.insert(v.id))
        .map(|v| Candidate::new(v, RecallSource::Random))
        .collect()
}
