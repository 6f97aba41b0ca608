//! Fixtures shared by the strategy tests.

use chrono::{Duration, Utc};
use store::*;

/// A published video owned by `100 + id`.
pub fn video(id: VideoId, category_id: CategoryId, hot: f64, minutes_ago: i64) -> Video {
    Video {
        id,
        owner_id: 100 + id,
        category_id,
        title: format!("clip {}", id),
        tags: vec![],
        published_at: Utc::now() - Duration::minutes(minutes_ago),
        duration: 60,
        status: VideoStatus::Published,
        quality_score: 80.0,
        hot_score: hot,
        play_count: 100,
        like_count: 5,
        comment_count: 1,
        share_count: 0,
    }
}

/// Three users and fourteen videos:
/// - 1..=12: category `id % 3 + 1`, hot `10 * id`, published `20 * id` minutes ago
/// - 13: category 1, hot 999, two days old
/// - 14: pending, never recalled
pub fn create_test_store() -> MemoryStore {
    let store = MemoryStore::new();
    for id in 1..=3 {
        store.add_user(UserProfile {
            id,
            nickname: format!("user{}", id),
            gender: Gender::Unknown,
            province: String::new(),
            city: String::new(),
            birth_year: None,
        });
    }
    for id in 1..=12u64 {
        store.add_video(video(id, (id % 3) as CategoryId + 1, 10.0 * id as f64, 20 * id as i64));
    }
    store.add_video(video(13, 1, 999.0, 48 * 60));
    let mut pending = video(14, 1, 500.0, 5);
    pending.status = VideoStatus::Pending;
    store.add_video(pending);
    store
}

pub fn like(user_id: UserId, video_id: VideoId) -> BehaviorEvent {
    BehaviorEvent::new(user_id, video_id, ActionType::Like)
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

pub fn follow(follower_id: UserId, author_id: UserId) -> Follow {
    Follow {
        follower_id,
        author_id,
        created_at: Utc::now(),
    }
}
