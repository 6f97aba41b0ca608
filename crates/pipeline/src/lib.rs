//! Feature extraction, ranking and filtering of recalled candidates.
//!
//! This crate provides:
//! - FeatureEngineer for cached user and video features
//! - Ranker for multi-objective scoring and the optional diversity pass
//! - Filter trait, filter implementations and the FilterPipeline
//! - HistoryStore for the watched, blocked and recommended sets
//! - InterestUpdater, the background worker that learns category interests
//!
//! ## Architecture
//! A request flows through the stages in order:
//! 1. FeatureEngineer extracts features for the viewer and every candidate
//! 2. Ranker scores and sorts the candidates
//! 3. FeedFilter drops watched, low-quality, blocked and over-represented
//!    videos, keeping the ranked order
//!
//! ## Example Usage
//! ```ignore
//! use pipeline::{FeatureEngineer, FeedFilter, FilterConfig, HistoryStore, Ranker};
//!
//! let engineer = FeatureEngineer::new(store.clone(), cache.clone());
//! let features = engineer.extract(Some(viewer_id), &candidates).await;
//!
//! let ranked = Ranker::new().rank(candidates, &features);
//!
//! let history = Arc::new(HistoryStore::new(store, cache));
//! let feed_filter = FeedFilter::new(history, &FilterConfig::default());
//! let page = feed_filter.filter(Some(viewer_id), ranked).await?;
//! ```

pub mod decay;
pub mod features;
pub mod filter_pipeline;
pub mod filters;
pub mod history;
pub mod interest;
pub mod ranker;
pub mod retry;
pub mod traits;

#[cfg(test)]
mod test_support;

// Re-export main types
pub use decay::Decay;
pub use features::{FeatureConfig, FeatureEngineer, Features, UserFeature, VideoFeature};
pub use filter_pipeline::{FeedFilter, FilterConfig, FilterPipeline};
pub use history::HistoryStore;
pub use interest::{DeadLetter, InterestConfig, InterestUpdater};
pub use ranker::{apply_diversity, RankWeights, Ranker, ScoreBreakdown, ScoredCandidate};
pub use retry::{with_retry, RetryConfig, RetryError};
pub use traits::{Filter, FilterContext};
