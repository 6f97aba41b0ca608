//! Core domain types for the short-video platform.
//!
//! These are the rows the recommendation pipeline reads from the
//! persistent store: users, videos, behavior events, interest records and
//! daily video aggregates.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Type Aliases
// =============================================================================

/// Unique identifier for a user (viewer or author)
pub type UserId = u64;

/// Unique identifier for a video
pub type VideoId = u64;

/// Unique identifier for a content category
pub type CategoryId = u32;

/// Unique identifier for a behavior event, used as an idempotency key
pub type EventId = Uuid;

// =============================================================================
// User-related Types
// =============================================================================

/// Base profile of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub city: String,
    /// Stored birth year; age is derived from it at feature time
    #[serde(default)]
    pub birth_year: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    #[default]
    Unknown,
    Male,
    Female,
}

// =============================================================================
// Video-related Types
// =============================================================================

/// Publication state of a video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    #[default]
    Pending,
    Published,
    Rejected,
    Deleted,
}

/// A video record as stored, and the unit the pipeline recalls and ranks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: VideoId,
    pub owner_id: UserId,
    pub category_id: CategoryId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub published_at: DateTime<Utc>,
    /// Duration in seconds
    pub duration: u32,
    #[serde(default)]
    pub status: VideoStatus,
    /// Editorial/automatic quality score in [0, 100]
    #[serde(default)]
    pub quality_score: f64,
    /// Persisted popularity metric, nominally in [0, 1000]
    #[serde(default)]
    pub hot_score: f64,
    #[serde(default)]
    pub play_count: u64,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    #[serde(default)]
    pub share_count: u64,
}

impl Video {
    pub fn is_published(&self) -> bool {
        self.status == VideoStatus::Published
    }

    /// Hours elapsed since publication, never negative.
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        let seconds = (now - self.published_at).num_seconds().max(0);
        seconds as f64 / 3600.0
    }
}

/// Aggregated per-day statistics for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDailyStats {
    pub video_id: VideoId,
    pub date: NaiveDate,
    pub play_count: u64,
    pub unique_viewers: u64,
    /// Fraction of plays watched to the end, in [0, 1]
    pub finish_rate: f64,
    /// Average watch time in seconds
    pub avg_watch_time: f64,
}

// =============================================================================
// Behavior Types
// =============================================================================

/// Kind of interaction a viewer had with a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    View,
    Like,
    Comment,
    Share,
    Favorite,
    /// Watched to the end
    Complete,
}

impl ActionType {
    /// Interest increment contributed by one event of this type.
    ///
    /// `completion` only matters for views, where the increment scales with
    /// the watched fraction.
    pub fn interest_increment(self, completion: f64) -> f64 {
        match self {
            ActionType::View => 0.1 * completion.clamp(0.0, 1.0),
            ActionType::Like => 0.3,
            ActionType::Comment => 0.4,
            ActionType::Share => 0.5,
            ActionType::Favorite => 0.6,
            ActionType::Complete => 0.8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::View => "view",
            ActionType::Like => "like",
            ActionType::Comment => "comment",
            ActionType::Share => "share",
            ActionType::Favorite => "favorite",
            ActionType::Complete => "complete",
        }
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(ActionType::View),
            "like" => Ok(ActionType::Like),
            "comment" => Ok(ActionType::Comment),
            "share" => Ok(ActionType::Share),
            "favorite" => Ok(ActionType::Favorite),
            "complete" => Ok(ActionType::Complete),
            other => Err(format!("unknown action type: {other}")),
        }
    }
}

/// One raw behavior event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorEvent {
    #[serde(default = "Uuid::new_v4")]
    pub id: EventId,
    pub user_id: UserId,
    pub video_id: VideoId,
    pub action: ActionType,
    /// Seconds watched (views)
    #[serde(default)]
    pub watch_time: f64,
    /// Fraction of the video watched, in [0, 1] (views)
    #[serde(default)]
    pub completion: f64,
    pub occurred_at: DateTime<Utc>,
}

impl BehaviorEvent {
    /// Build an event stamped with a fresh id and the current time.
    pub fn new(user_id: UserId, video_id: VideoId, action: ActionType) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            video_id,
            action,
            watch_time: 0.0,
            completion: 0.0,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_watch(mut self, watch_time: f64, completion: f64) -> Self {
        self.watch_time = watch_time;
        self.completion = completion;
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}

// =============================================================================
// Interest Types
// =============================================================================

/// Affinity of one user for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestRecord {
    pub user_id: UserId,
    pub category_id: CategoryId,
    /// Smoothed affinity, always in [0, 1]
    pub score: f64,
    pub weight: f64,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub like_count: u64,
    pub updated_at: DateTime<Utc>,
}

/// Follow edge between a viewer and an author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follow {
    pub follower_id: UserId,
    pub author_id: UserId,
    pub created_at: DateTime<Utc>,
}
