//! Trait seams for the two external collaborators of the pipeline:
//! the persistent store and the key-value cache.
//!
//! Both are async because every call is a potential network round-trip.
//! Implementations must be `Send + Sync` so they can be shared behind an
//! `Arc` across concurrent requests and the background interest worker.

use crate::error::{CacheResult, StoreResult};
use crate::types::*;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::time::Duration;

/// Ordering applied by `VideoStore::query_videos`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VideoOrder {
    /// Highest hot score first
    #[default]
    HotDesc,
    /// Most recently published first
    NewestFirst,
    /// Arbitrary order (fallback fill)
    Random,
}

/// Query over published videos.
///
/// Built with chained setters:
/// ```ignore
/// let query = VideoQuery::published(50)
///     .in_categories(vec![3, 7])
///     .since(now - Duration::hours(24))
///     .order_by(VideoOrder::HotDesc);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoQuery {
    /// Restrict to these categories (empty = any)
    pub categories: Vec<CategoryId>,
    /// Restrict to these owners (empty = any)
    pub owners: Vec<UserId>,
    /// Only videos published at or after this instant
    pub published_since: Option<DateTime<Utc>>,
    /// Videos to leave out of the result
    pub exclude: Vec<VideoId>,
    pub order: VideoOrder,
    pub limit: usize,
}

impl VideoQuery {
    pub fn published(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    pub fn in_categories(mut self, categories: Vec<CategoryId>) -> Self {
        self.categories = categories;
        self
    }

    pub fn by_owners(mut self, owners: Vec<UserId>) -> Self {
        self.owners = owners;
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.published_since = Some(since);
        self
    }

    pub fn excluding(mut self, exclude: Vec<VideoId>) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn order_by(mut self, order: VideoOrder) -> Self {
        self.order = order;
        self
    }
}

/// Persistent store queried by the pipeline.
#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Fetch a user profile; `NotFound` if absent.
    async fn get_user(&self, user_id: UserId) -> StoreResult<UserProfile>;

    /// Behavior events of a user at or after `since`, oldest first.
    async fn behaviors_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<BehaviorEvent>>;

    /// Persist one raw behavior event. An event whose id is already stored
    /// is ignored; returns whether the event was new.
    async fn insert_behavior(&self, event: &BehaviorEvent) -> StoreResult<bool>;

    /// Highest-score interest records of a user.
    async fn top_interests(&self, user_id: UserId, limit: usize)
    -> StoreResult<Vec<InterestRecord>>;

    async fn get_interest(
        &self,
        user_id: UserId,
        category_id: CategoryId,
    ) -> StoreResult<Option<InterestRecord>>;

    /// Create or replace the record for `(user_id, category_id)` and mark
    /// `event_id` applied, as one atomic write.
    ///
    /// Nothing is written when `event_id` is already applied; returns
    /// whether the record was written.
    async fn apply_interest(&self, record: &InterestRecord, event_id: EventId)
    -> StoreResult<bool>;

    /// Fetch a video; `NotFound` if absent.
    async fn get_video(&self, video_id: VideoId) -> StoreResult<Video>;

    /// Fetch several videos, preserving input order and skipping missing ids.
    async fn get_videos(&self, video_ids: &[VideoId]) -> StoreResult<Vec<Video>>;

    /// Aggregated stats row of a video for one day, if any.
    async fn daily_stats(
        &self,
        video_id: VideoId,
        date: NaiveDate,
    ) -> StoreResult<Option<VideoDailyStats>>;

    /// Most recently liked videos of a user, newest like first.
    async fn recent_likes(&self, user_id: UserId, limit: usize) -> StoreResult<Vec<VideoId>>;

    /// Users (other than `exclude_user`) who liked any of `video_ids`.
    async fn users_who_liked(
        &self,
        video_ids: &[VideoId],
        exclude_user: UserId,
        limit: usize,
    ) -> StoreResult<Vec<UserId>>;

    /// Published videos liked by any of `user_ids`, ordered by the number of
    /// those users who liked them (descending), leaving out `exclude`.
    async fn videos_liked_by(
        &self,
        user_ids: &[UserId],
        exclude: &[VideoId],
        limit: usize,
    ) -> StoreResult<Vec<Video>>;

    /// Published videos matching `query`.
    async fn query_videos(&self, query: &VideoQuery) -> StoreResult<Vec<Video>>;

    /// Authors followed by a user, most recent follow first.
    async fn followed_authors(&self, user_id: UserId, limit: usize) -> StoreResult<Vec<UserId>>;

    /// Whether the interest update for this event was already applied.
    async fn is_event_applied(&self, event_id: EventId) -> StoreResult<bool>;
}

/// Key-value cache with TTLs, sets and sorted sets.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    async fn exists(&self, key: &str) -> CacheResult<bool>;

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()>;

    async fn set_add(&self, key: &str, members: &[String]) -> CacheResult<()>;

    async fn set_remove(&self, key: &str, members: &[String]) -> CacheResult<()>;

    async fn set_is_member(&self, key: &str, member: &str) -> CacheResult<bool>;

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>>;

    /// Atomically replace a sorted set with `members` (member, score) and
    /// give it a TTL.
    async fn zset_replace(
        &self,
        key: &str,
        members: &[(String, f64)],
        ttl: Duration,
    ) -> CacheResult<()>;

    /// Up to `limit` members, highest score first.
    async fn zset_rev_range(&self, key: &str, limit: usize) -> CacheResult<Vec<(String, f64)>>;
}

/// Cache key layout shared by recall, features and history.
pub mod keys {
    use crate::types::{UserId, VideoId};

    /// Ranked ids of hot videos from the last 24 hours
    pub const HOT_VIDEOS: &str = "recall:hot:24h";

    pub fn user_feature(user_id: UserId) -> String {
        format!("feature:user:{}", user_id)
    }

    pub fn video_feature(video_id: VideoId) -> String {
        format!("feature:video:{}", video_id)
    }

    pub fn watched(user_id: UserId) -> String {
        format!("history:watched:{}", user_id)
    }

    pub fn recommended(user_id: UserId) -> String {
        format!("history:recommended:{}", user_id)
    }

    pub fn blocked(user_id: UserId) -> String {
        format!("history:blocked:{}", user_id)
    }
}
