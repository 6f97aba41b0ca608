//! # Sources Crate
//!
//! Candidate recall for the short-video feed.
//!
//! ## Strategies
//!
//! Each strategy is an independent `RecallStrategy` and asks for a share of
//! the target pool size N:
//!
//! - **Collaborative** (N/4): "viewers who liked what you liked also liked..."
//! - **Content** (N/4): hottest videos in the viewer's top interest categories
//! - **Hot** (N/4): hottest videos of the last 24 hours, cached as a sorted set
//! - **Follow** (N/2, follow scene only): newest videos of followed authors
//! - **New** (N/4): videos published in the last hour
//!
//! The `Recaller` runs them concurrently under one deadline, merges their
//! output in that order without duplicates, and tops up a short pool with
//! random published videos.
//!
//! ## Example Usage
//!
//! ```ignore
//! use sources::{Recaller, RecallRequest, Scene};
//! use store::{MemoryCache, MemoryStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::load_from_dir("data/seed".as_ref())?);
//! let recaller = Recaller::new(store, Arc::new(MemoryCache::new()));
//!
//! let pool = recaller.recall(&RecallRequest::new(Some(7), Scene::Feed, 200)).await;
//! ```

pub mod collaborative;
pub mod content;
pub mod follow;
pub mod hot;
pub mod new_video;
pub mod recaller;
pub mod strategy;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use collaborative::CollaborativeStrategy;
pub use content::ContentStrategy;
pub use follow::FollowStrategy;
pub use hot::HotStrategy;
pub use new_video::NewVideoStrategy;
pub use recaller::{RecallConfig, Recaller};
pub use strategy::RecallStrategy;
pub use types::{Candidate, RecallRequest, RecallSource, RecallStats, Scene};
