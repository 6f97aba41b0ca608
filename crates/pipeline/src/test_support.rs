//! Fixtures shared by the pipeline unit tests.

use crate::features::UserFeature;
use crate::ranker::{ScoreBreakdown, ScoredCandidate};
use chrono::{Duration, Utc};
use sources::RecallSource;
use std::collections::HashMap;
use store::*;

pub fn user(id: UserId) -> UserProfile {
    UserProfile {
        id,
        nickname: format!("user{}", id),
        gender: Gender::Female,
        province: "Zhejiang".to_string(),
        city: "Hangzhou".to_string(),
        birth_year: None,
    }
}

/// A published two-hour-old video owned by `100 + id`.
pub fn video(id: VideoId, category_id: CategoryId) -> Video {
    Video {
        id,
        owner_id: 100 + id,
        category_id,
        title: format!("clip {}", id),
        tags: vec!["test".to_string()],
        published_at: Utc::now() - Duration::hours(2),
        duration: 60,
        status: VideoStatus::Published,
        quality_score: 80.0,
        hot_score: 100.0,
        play_count: 100,
        like_count: 10,
        comment_count: 2,
        share_count: 1,
    }
}

/// A ranked candidate with a neutral score.
pub fn scored(id: VideoId, category_id: CategoryId) -> ScoredCandidate {
    ScoredCandidate {
        video: video(id, category_id),
        source: RecallSource::Hot,
        score: 0.5,
        breakdown: ScoreBreakdown::default(),
    }
}

pub fn user_feature(user_id: UserId) -> UserFeature {
    UserFeature {
        user_id,
        gender: Gender::Unknown,
        province: String::new(),
        city: String::new(),
        age: None,
        active_days: 0,
        avg_watch_time: 0.0,
        avg_completion: 0.0,
        like_rate: 0.0,
        comment_rate: 0.0,
        share_rate: 0.0,
        active_hours: vec![],
        interests: HashMap::new(),
        computed_at: Utc::now(),
    }
}

pub fn interest(user_id: UserId, category_id: CategoryId, score: f64) -> InterestRecord {
    InterestRecord {
        user_id,
        category_id,
        score,
        weight: 1.0,
        view_count: 1,
        like_count: 0,
        updated_at: Utc::now(),
    }
}

/// Two users and ten videos, `id % 3 + 1` categories.
pub fn create_test_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.add_user(user(1));
    store.add_user(user(2));
    for id in 1..=10 {
        store.add_video(video(id, (id % 3) as CategoryId + 1));
    }
    store
}
