//! In-memory `VideoStore` implementation.
//!
//! `MemoryStore` keeps every table in hash maps with a couple of secondary
//! indices (videos by category, likers by video) so the recall queries stay
//! cheap. It backs the CLI, the harness binary and all tests.
//!
//! Failure injection: `inject_failure("query_videos")` makes that operation
//! return `StoreError::Unavailable` until `clear_failures` is called. The
//! operation names are the `VideoStore` method names.

use crate::error::{SeedError, StoreError, StoreResult};
use crate::traits::{VideoOrder, VideoQuery, VideoStore};
use crate::types::*;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, UserProfile>,
    videos: HashMap<VideoId, Video>,
    /// All events per user, in insertion order
    behaviors: HashMap<UserId, Vec<BehaviorEvent>>,
    interests: HashMap<(UserId, CategoryId), InterestRecord>,
    follows: HashMap<UserId, Vec<Follow>>,
    daily_stats: HashMap<(VideoId, NaiveDate), VideoDailyStats>,
    applied_events: HashSet<EventId>,
    /// Ids of every stored behavior event
    behavior_ids: HashSet<EventId>,

    // Secondary indices
    /// Videos grouped by category
    category_index: HashMap<CategoryId, Vec<VideoId>>,
    /// Distinct users who liked each video
    likers: HashMap<VideoId, HashSet<UserId>>,
}

impl Tables {
    /// Store an event unless its id is already stored.
    fn record_behavior(&mut self, event: BehaviorEvent) -> bool {
        if !self.behavior_ids.insert(event.id) {
            return false;
        }
        self.index_like(&event);
        self.behaviors.entry(event.user_id).or_default().push(event);
        true
    }

    fn index_like(&mut self, event: &BehaviorEvent) {
        if event.action == ActionType::Like {
            self.likers
                .entry(event.video_id)
                .or_default()
                .insert(event.user_id);
        }
    }
}

/// Thread-safe in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    failing_ops: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Mutators used by the seed loader and tests

    pub fn add_user(&self, user: UserProfile) {
        if let Ok(mut tables) = self.tables.write() {
            tables.users.insert(user.id, user);
        }
    }

    /// Insert or replace a video and keep the category index in sync.
    pub fn add_video(&self, video: Video) {
        if let Ok(mut tables) = self.tables.write() {
            if let Some(previous) = tables.videos.get(&video.id).map(|v| v.category_id)
                && let Some(ids) = tables.category_index.get_mut(&previous)
            {
                ids.retain(|&id| id != video.id);
            }
            tables
                .category_index
                .entry(video.category_id)
                .or_default()
                .push(video.id);
            tables.videos.insert(video.id, video);
        }
    }

    pub fn add_behavior(&self, event: BehaviorEvent) {
        if let Ok(mut tables) = self.tables.write() {
            tables.record_behavior(event);
        }
    }

    pub fn add_interest(&self, record: InterestRecord) {
        if let Ok(mut tables) = self.tables.write() {
            tables
                .interests
                .insert((record.user_id, record.category_id), record);
        }
    }

    pub fn add_follow(&self, follow: Follow) {
        if let Ok(mut tables) = self.tables.write() {
            tables
                .follows
                .entry(follow.follower_id)
                .or_default()
                .push(follow);
        }
    }

    pub fn add_daily_stats(&self, stats: VideoDailyStats) {
        if let Ok(mut tables) = self.tables.write() {
            tables.daily_stats.insert((stats.video_id, stats.date), stats);
        }
    }

    /// Make operation `op` fail with `Unavailable` until cleared.
    pub fn inject_failure(&self, op: &str) {
        if let Ok(mut ops) = self.failing_ops.lock() {
            ops.insert(op.to_string());
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut ops) = self.failing_ops.lock() {
            ops.clear();
        }
    }

    /// (users, videos, behavior events) for debugging/validation
    pub fn counts(&self) -> (usize, usize, usize) {
        match self.tables.read() {
            Ok(tables) => {
                let events = tables.behaviors.values().map(|v| v.len()).sum();
                (tables.users.len(), tables.videos.len(), events)
            }
            Err(_) => (0, 0, 0),
        }
    }

    /// All video ids, sorted (CLI listing and benchmarks)
    pub fn video_ids(&self) -> Vec<VideoId> {
        let mut ids: Vec<VideoId> = match self.tables.read() {
            Ok(tables) => tables.videos.keys().copied().collect(),
            Err(_) => Vec::new(),
        };
        ids.sort_unstable();
        ids
    }

    /// All user ids, sorted
    pub fn user_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = match self.tables.read() {
            Ok(tables) => tables.users.keys().copied().collect(),
            Err(_) => Vec::new(),
        };
        ids.sort_unstable();
        ids
    }

    /// Check that every event, follow, interest and stats row references
    /// a known user and video.
    pub fn validate(&self) -> crate::error::Result<()> {
        let tables = self.tables.read().map_err(|_| SeedError::MissingReference {
            entity: "tables".to_string(),
            id: 0,
        })?;

        let missing_user = |id: UserId| SeedError::MissingReference {
            entity: "User".to_string(),
            id,
        };
        let missing_video = |id: VideoId| SeedError::MissingReference {
            entity: "Video".to_string(),
            id,
        };

        for events in tables.behaviors.values() {
            for event in events {
                if !tables.users.contains_key(&event.user_id) {
                    return Err(missing_user(event.user_id));
                }
                if !tables.videos.contains_key(&event.video_id) {
                    return Err(missing_video(event.video_id));
                }
            }
        }
        for follows in tables.follows.values() {
            for follow in follows {
                if !tables.users.contains_key(&follow.follower_id) {
                    return Err(missing_user(follow.follower_id));
                }
                if !tables.users.contains_key(&follow.author_id) {
                    return Err(missing_user(follow.author_id));
                }
            }
        }
        for (user_id, _) in tables.interests.keys() {
            if !tables.users.contains_key(user_id) {
                return Err(missing_user(*user_id));
            }
        }
        for (video_id, _) in tables.daily_stats.keys() {
            if !tables.videos.contains_key(video_id) {
                return Err(missing_video(*video_id));
            }
        }
        Ok(())
    }

    fn check(&self, op: &str) -> StoreResult<()> {
        let failing = self
            .failing_ops
            .lock()
            .map(|ops| ops.contains(op))
            .unwrap_or(false);
        if failing {
            return Err(StoreError::Unavailable(format!("{} failed (injected)", op)));
        }
        Ok(())
    }

    fn read(&self, op: &str) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.check(op)?;
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    fn write(&self, op: &str) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.check(op)?;
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }
}

/// Order videos by descending count, then ascending id.
fn rank_by_count(counts: HashMap<VideoId, usize>) -> Vec<VideoId> {
    let mut ranked: Vec<(VideoId, usize)> = counts.into_iter().collect();
    ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.into_iter().map(|(id, _)| id).collect()
}

#[async_trait]
impl VideoStore for MemoryStore {
    async fn get_user(&self, user_id: UserId) -> StoreResult<UserProfile> {
        let tables = self.read("get_user")?;
        tables
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("user", user_id))
    }

    async fn behaviors_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<BehaviorEvent>> {
        let tables = self.read("behaviors_since")?;
        let mut events: Vec<BehaviorEvent> = tables
            .behaviors
            .get(&user_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.occurred_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        events.sort_by_key(|e| e.occurred_at);
        Ok(events)
    }

    async fn insert_behavior(&self, event: &BehaviorEvent) -> StoreResult<bool> {
        let mut tables = self.write("insert_behavior")?;
        Ok(tables.record_behavior(event.clone()))
    }

    async fn top_interests(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> StoreResult<Vec<InterestRecord>> {
        let tables = self.read("top_interests")?;
        let mut records: Vec<InterestRecord> = tables
            .interests
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.category_id.cmp(&b.category_id))
        });
        records.truncate(limit);
        Ok(records)
    }

    async fn get_interest(
        &self,
        user_id: UserId,
        category_id: CategoryId,
    ) -> StoreResult<Option<InterestRecord>> {
        let tables = self.read("get_interest")?;
        Ok(tables.interests.get(&(user_id, category_id)).cloned())
    }

    async fn apply_interest(
        &self,
        record: &InterestRecord,
        event_id: EventId,
    ) -> StoreResult<bool> {
        let mut tables = self.write("apply_interest")?;
        if !tables.applied_events.insert(event_id) {
            return Ok(false);
        }
        tables
            .interests
            .insert((record.user_id, record.category_id), record.clone());
        Ok(true)
    }

    async fn get_video(&self, video_id: VideoId) -> StoreResult<Video> {
        let tables = self.read("get_video")?;
        tables
            .videos
            .get(&video_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("video", video_id))
    }

    async fn get_videos(&self, video_ids: &[VideoId]) -> StoreResult<Vec<Video>> {
        let tables = self.read("get_videos")?;
        Ok(video_ids
            .iter()
            .filter_map(|id| tables.videos.get(id).cloned())
            .collect())
    }

    async fn daily_stats(
        &self,
        video_id: VideoId,
        date: NaiveDate,
    ) -> StoreResult<Option<VideoDailyStats>> {
        let tables = self.read("daily_stats")?;
        Ok(tables.daily_stats.get(&(video_id, date)).cloned())
    }

    async fn recent_likes(&self, user_id: UserId, limit: usize) -> StoreResult<Vec<VideoId>> {
        let tables = self.read("recent_likes")?;
        let mut likes: Vec<&BehaviorEvent> = tables
            .behaviors
            .get(&user_id)
            .map(|events| events.iter().filter(|e| e.action == ActionType::Like).collect())
            .unwrap_or_default();
        likes.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));

        let mut seen = HashSet::new();
        Ok(likes
            .into_iter()
            .map(|e| e.video_id)
            .filter(|id| seen.insert(*id))
            .take(limit)
            .collect())
    }

    async fn users_who_liked(
        &self,
        video_ids: &[VideoId],
        exclude_user: UserId,
        limit: usize,
    ) -> StoreResult<Vec<UserId>> {
        let tables = self.read("users_who_liked")?;
        let mut shared: HashMap<UserId, usize> = HashMap::new();
        for video_id in video_ids {
            if let Some(users) = tables.likers.get(video_id) {
                for &user_id in users {
                    if user_id != exclude_user {
                        *shared.entry(user_id).or_insert(0) += 1;
                    }
                }
            }
        }
        let mut ranked: Vec<(UserId, usize)> = shared.into_iter().collect();
        ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(limit);
        Ok(ranked.into_iter().map(|(id, _)| id).collect())
    }

    async fn videos_liked_by(
        &self,
        user_ids: &[UserId],
        exclude: &[VideoId],
        limit: usize,
    ) -> StoreResult<Vec<Video>> {
        let tables = self.read("videos_liked_by")?;
        let users: HashSet<UserId> = user_ids.iter().copied().collect();
        let excluded: HashSet<VideoId> = exclude.iter().copied().collect();

        let mut co_likes: HashMap<VideoId, usize> = HashMap::new();
        for (video_id, likers) in &tables.likers {
            if excluded.contains(video_id) {
                continue;
            }
            let count = likers.iter().filter(|u| users.contains(u)).count();
            if count > 0 {
                co_likes.insert(*video_id, count);
            }
        }

        Ok(rank_by_count(co_likes)
            .into_iter()
            .filter_map(|id| tables.videos.get(&id))
            .filter(|v| v.is_published())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn query_videos(&self, query: &VideoQuery) -> StoreResult<Vec<Video>> {
        let tables = self.read("query_videos")?;
        let excluded: HashSet<VideoId> = query.exclude.iter().copied().collect();

        let pool: Vec<&Video> = if query.categories.is_empty() {
            tables.videos.values().collect()
        } else {
            query
                .categories
                .iter()
                .flat_map(|c| tables.category_index.get(c).into_iter().flatten())
                .filter_map(|id| tables.videos.get(id))
                .collect()
        };

        let mut matches: Vec<&Video> = pool
            .into_iter()
            .filter(|v| v.is_published())
            .filter(|v| !excluded.contains(&v.id))
            .filter(|v| query.owners.is_empty() || query.owners.contains(&v.owner_id))
            .filter(|v| query.published_since.is_none_or(|since| v.published_at >= since))
            .collect();

        match query.order {
            VideoOrder::HotDesc => matches.sort_by(|a, b| {
                b.hot_score.total_cmp(&a.hot_score).then(a.id.cmp(&b.id))
            }),
            VideoOrder::NewestFirst => matches.sort_by(|a, b| {
                b.published_at.cmp(&a.published_at).then(a.id.cmp(&b.id))
            }),
            VideoOrder::Random => matches.shuffle(&mut rand::rng()),
        }

        matches.truncate(query.limit);
        Ok(matches.into_iter().cloned().collect())
    }

    async fn followed_authors(&self, user_id: UserId, limit: usize) -> StoreResult<Vec<UserId>> {
        let tables = self.read("followed_authors")?;
        let mut follows: Vec<&Follow> = tables
            .follows
            .get(&user_id)
            .map(|f| f.iter().collect())
            .unwrap_or_default();
        follows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(follows.into_iter().take(limit).map(|f| f.author_id).collect())
    }

    async fn is_event_applied(&self, event_id: EventId) -> StoreResult<bool> {
        let tables = self.read("is_event_applied")?;
        Ok(tables.applied_events.contains(&event_id))
    }
}
