//! Feature extraction for ranking.
//!
//! Features are read cache-aside: try the cache, compute from the store on a
//! miss (or any cache error), then write the result back with a TTL. Cache
//! problems are logged and never surface.

use crate::decay::Decay;
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Timelike, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use sources::Candidate;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use store::*;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

/// Viewer-level features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFeature {
    pub user_id: UserId,
    pub gender: Gender,
    pub province: String,
    pub city: String,
    /// Current year minus birth year
    pub age: Option<i32>,

    // Trailing-window behavior aggregates
    /// Distinct UTC calendar days with at least one event
    pub active_days: u32,
    /// Mean watch time of view events, seconds
    pub avg_watch_time: f64,
    /// Mean completion fraction of view events
    pub avg_completion: f64,
    pub like_rate: f64,
    pub comment_rate: f64,
    pub share_rate: f64,
    /// Up to three most active UTC hours, busiest first
    pub active_hours: Vec<u32>,

    /// Category affinity in [0, 1]
    pub interests: HashMap<CategoryId, f64>,
    pub computed_at: DateTime<Utc>,
}

impl UserFeature {
    pub fn interest(&self, category_id: CategoryId) -> Option<f64> {
        self.interests.get(&category_id).copied()
    }
}

/// Video-level features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFeature {
    pub video_id: VideoId,
    pub owner_id: UserId,
    pub category_id: CategoryId,
    pub duration: u32,
    pub quality_score: f64,
    pub hot_score: f64,
    pub title: String,
    pub tags: Vec<String>,

    /// Hyperbolic freshness in (0, 1]
    pub freshness: f64,
    pub like_rate: f64,
    pub comment_rate: f64,
    pub share_rate: f64,

    // Yesterday's daily stats, zero when absent
    pub finish_rate: f64,
    pub avg_watch_time: f64,
    pub ctr: f64,

    pub computed_at: DateTime<Utc>,
}

/// Everything the ranker needs for one request.
#[derive(Debug, Clone, Default)]
pub struct Features {
    pub user: Option<UserFeature>,
    pub videos: HashMap<VideoId, VideoFeature>,
}

impl Features {
    pub fn video(&self, video_id: VideoId) -> Option<&VideoFeature> {
        self.videos.get(&video_id)
    }
}

/// FeatureEngineer tunables
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureConfig {
    /// Bound on each individual feature lookup
    pub timeout: Duration,
    pub user_ttl: Duration,
    pub video_ttl: Duration,
    /// Behavior window of the user aggregates
    pub lookback_days: i64,
    pub max_interests: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(300),
            user_ttl: Duration::from_secs(3600),
            video_ttl: Duration::from_secs(1800),
            lookback_days: 30,
            max_interests: 10,
        }
    }
}

impl FeatureConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Computes and caches user and video features.
#[derive(Clone)]
pub struct FeatureEngineer {
    store: Arc<dyn VideoStore>,
    cache: Arc<dyn Cache>,
    config: FeatureConfig,
}

impl FeatureEngineer {
    pub fn new(store: Arc<dyn VideoStore>, cache: Arc<dyn Cache>) -> Self {
        Self {
            store,
            cache,
            config: FeatureConfig::default(),
        }
    }

    pub fn with_config(mut self, config: FeatureConfig) -> Self {
        self.config = config;
        self
    }

    /// Features for a viewer and a candidate pool.
    ///
    /// Lookups run concurrently, each bounded by the configured timeout. A
    /// lookup that fails or times out is left out of the result.
    #[instrument(skip(self, candidates), fields(viewer_id = ?viewer_id, candidates = candidates.len()))]
    pub async fn extract(&self, viewer_id: Option<UserId>, candidates: &[Candidate]) -> Features {
        let user_lookup = async {
            let user_id = viewer_id?;
            match timeout(self.config.timeout, self.user_feature(user_id)).await {
                Ok(Ok(feature)) => Some(feature),
                Ok(Err(e)) => {
                    warn!("User feature for {} unavailable: {:#}", user_id, e);
                    None
                }
                Err(_) => {
                    warn!("User feature for {} timed out", user_id);
                    None
                }
            }
        };

        let video_lookups = join_all(candidates.iter().map(|candidate| async move {
            match timeout(self.config.timeout, self.video_feature(&candidate.video)).await {
                Ok(Ok(feature)) => Some(feature),
                Ok(Err(e)) => {
                    warn!("Video feature for {} unavailable: {:#}", candidate.id(), e);
                    None
                }
                Err(_) => {
                    warn!("Video feature for {} timed out", candidate.id());
                    None
                }
            }
        }));

        let (user, videos) = tokio::join!(user_lookup, video_lookups);
        let videos: HashMap<VideoId, VideoFeature> = videos
            .into_iter()
            .flatten()
            .map(|feature| (feature.video_id, feature))
            .collect();

        debug!(
            "Extracted features: user={}, videos={}/{}",
            user.is_some(),
            videos.len(),
            candidates.len()
        );
        Features { user, videos }
    }

    /// Cached user feature, computed from the store on a miss.
    pub async fn user_feature(&self, user_id: UserId) -> Result<UserFeature> {
        let key = keys::user_feature(user_id);
        if let Some(feature) = self.cached(&key).await {
            return Ok(feature);
        }

        let now = Utc::now();
        let profile = self
            .store
            .get_user(user_id)
            .await
            .with_context(|| format!("Failed to load user {}", user_id))?;
        let events = self
            .store
            .behaviors_since(user_id, now - ChronoDuration::days(self.config.lookback_days))
            .await
            .context("Failed to load recent behaviors")?;
        let interests = self
            .store
            .top_interests(user_id, self.config.max_interests)
            .await
            .context("Failed to load interests")?;

        let feature = compute_user_feature(&profile, &events, &interests, now);
        self.write_back(&key, &feature, self.config.user_ttl).await;
        Ok(feature)
    }

    /// Cached video feature, computed from `video` and yesterday's stats on
    /// a miss.
    pub async fn video_feature(&self, video: &Video) -> Result<VideoFeature> {
        let key = keys::video_feature(video.id);
        if let Some(feature) = self.cached(&key).await {
            return Ok(feature);
        }

        let now = Utc::now();
        let yesterday = now.date_naive() - ChronoDuration::days(1);
        let stats = self
            .store
            .daily_stats(video.id, yesterday)
            .await
            .with_context(|| format!("Failed to load daily stats of video {}", video.id))?;

        let feature = compute_video_feature(video, stats.as_ref(), now);
        self.write_back(&key, &feature, self.config.video_ttl).await;
        Ok(feature)
    }

    /// Like `video_feature`, loading the video first.
    pub async fn video_feature_by_id(&self, video_id: VideoId) -> Result<VideoFeature> {
        let video = self
            .store
            .get_video(video_id)
            .await
            .with_context(|| format!("Failed to load video {}", video_id))?;
        self.video_feature(&video).await
    }

    pub async fn evict_user(&self, user_id: UserId) {
        self.evict(&keys::user_feature(user_id)).await;
    }

    pub async fn evict_video(&self, video_id: VideoId) {
        self.evict(&keys::video_feature(video_id)).await;
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Discarding undecodable cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read of {} failed: {}", key, e);
                None
            }
        }
    }

    async fn write_back<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to encode {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.cache.set_ex(key, &raw, ttl).await {
            warn!("Cache write of {} failed: {}", key, e);
        }
    }

    async fn evict(&self, key: &str) {
        if let Err(e) = self.cache.delete(key).await {
            warn!("Cache eviction of {} failed: {}", key, e);
        }
    }
}

/// Aggregate a user's profile, trailing events and interests.
pub fn compute_user_feature(
    profile: &UserProfile,
    events: &[BehaviorEvent],
    interests: &[InterestRecord],
    now: DateTime<Utc>,
) -> UserFeature {
    let total = events.len() as f64;
    let rate = |action: ActionType| {
        if events.is_empty() {
            0.0
        } else {
            events.iter().filter(|e| e.action == action).count() as f64 / total
        }
    };

    let views: Vec<&BehaviorEvent> = events
        .iter()
        .filter(|e| e.action == ActionType::View)
        .collect();
    let (avg_watch_time, avg_completion) = if views.is_empty() {
        (0.0, 0.0)
    } else {
        let n = views.len() as f64;
        (
            views.iter().map(|e| e.watch_time).sum::<f64>() / n,
            views.iter().map(|e| e.completion).sum::<f64>() / n,
        )
    };

    let active_days = events
        .iter()
        .map(|e| e.occurred_at.date_naive())
        .collect::<HashSet<_>>()
        .len() as u32;

    UserFeature {
        user_id: profile.id,
        gender: profile.gender,
        province: profile.province.clone(),
        city: profile.city.clone(),
        age: profile.birth_year.map(|year| now.year() - year),
        active_days,
        avg_watch_time,
        avg_completion,
        like_rate: rate(ActionType::Like),
        comment_rate: rate(ActionType::Comment),
        share_rate: rate(ActionType::Share),
        active_hours: top_hours(events, 3),
        interests: interests
            .iter()
            .map(|r| (r.category_id, r.score.clamp(0.0, 1.0)))
            .collect(),
        computed_at: now,
    }
}

/// Busiest hours of the day; ties go to the earlier hour.
fn top_hours(events: &[BehaviorEvent], n: usize) -> Vec<u32> {
    let mut counts = [0usize; 24];
    for event in events {
        counts[event.occurred_at.hour() as usize] += 1;
    }
    let mut hours: Vec<(u32, usize)> = counts
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .map(|(hour, &count)| (hour as u32, count))
        .collect();
    hours.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    hours.into_iter().take(n).map(|(hour, _)| hour).collect()
}

/// Like, comment and share counts per play, all zero for an unplayed video.
pub fn engagement_rates(video: &Video) -> (f64, f64, f64) {
    let per_play = |count: u64| {
        if video.play_count == 0 {
            0.0
        } else {
            count as f64 / video.play_count as f64
        }
    };
    (
        per_play(video.like_count),
        per_play(video.comment_count),
        per_play(video.share_count),
    )
}

/// Derive ratios and freshness from a video row and yesterday's stats.
pub fn compute_video_feature(
    video: &Video,
    yesterday: Option<&VideoDailyStats>,
    now: DateTime<Utc>,
) -> VideoFeature {
    let (like_rate, comment_rate, share_rate) = engagement_rates(video);

    let (finish_rate, avg_watch_time, ctr) = match yesterday {
        Some(stats) => (
            stats.finish_rate,
            stats.avg_watch_time,
            if stats.unique_viewers == 0 {
                0.0
            } else {
                stats.play_count as f64 / stats.unique_viewers as f64
            },
        ),
        None => (0.0, 0.0, 0.0),
    };

    VideoFeature {
        video_id: video.id,
        owner_id: video.owner_id,
        category_id: video.category_id,
        duration: video.duration,
        quality_score: video.quality_score,
        hot_score: video.hot_score,
        title: video.title.clone(),
        tags: video.tags.clone(),
        freshness: Decay::FEATURE_FRESHNESS.apply(video.age_hours(now)),
        like_rate,
        comment_rate,
        share_rate,
        finish_rate,
        avg_watch_time,
        ctr,
        computed_at: now,
    }
}
