//! Server crate for the short-video feed recommender.
//!
//! This crate contains the feed engine that composes recall, feature
//! extraction, ranking and filtering into paged responses, plus its
//! configuration and error types.

pub mod config;
pub mod error;
pub mod orchestrator;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use orchestrator::{paginate, FeedEngine, FeedPage, FeedRequest};
