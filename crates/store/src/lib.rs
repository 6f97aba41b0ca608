//! # Store Crate
//!
//! Data access for the short-video feed recommender.
//!
//! ## Main Components
//!
//! - **types**: Domain rows (UserProfile, Video, BehaviorEvent, InterestRecord, ...)
//! - **traits**: The `VideoStore` and `Cache` seams plus the cache key layout
//! - **index**: `MemoryStore`, an in-memory `VideoStore` with secondary indices
//! - **cache**: `MemoryCache`, an in-memory `Cache` with Redis-like semantics
//! - **redis_cache**: `RedisCache`, the production `Cache`
//! - **parser**: Load a JSON-lines seed directory into a `MemoryStore`
//! - **error**: Error types for store, cache and seed loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use store::{MemoryStore, VideoStore};
//! use std::path::Path;
//!
//! let store = MemoryStore::load_from_dir(Path::new("data/seed"))?;
//! let video = store.get_video(42).await?;
//! let interests = store.top_interests(7, 10).await?;
//! ```

pub mod cache;
pub mod error;
pub mod index;
pub mod parser;
pub mod redis_cache;
pub mod traits;
pub mod types;

pub use cache::MemoryCache;
pub use error::{CacheError, CacheResult, SeedError, StoreError, StoreResult};
pub use index::MemoryStore;
pub use redis_cache::RedisCache;
pub use traits::{keys, Cache, VideoOrder, VideoQuery, VideoStore};
pub use types::{
    // Type aliases
    CategoryId,
    EventId,
    UserId,
    VideoId,
    // Core types
    BehaviorEvent,
    Follow,
    InterestRecord,
    UserProfile,
    Video,
    VideoDailyStats,
    // Enums
    ActionType,
    Gender,
    VideoStatus,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_memory_store_creation() {
        let store = MemoryStore::new();
        assert_eq!(store.counts(), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_trait_objects_are_shareable() {
        let store: Arc<dyn VideoStore> = Arc::new(MemoryStore::new());
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());

        assert!(store.get_video(1).await.unwrap_err().is_not_found());
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(keys::user_feature(3), "feature:user:3");
        assert_eq!(keys::video_feature(9), "feature:video:9");
        assert_eq!(keys::watched(3), "history:watched:3");
    }
}
