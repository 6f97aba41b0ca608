//! Filter implementations for the feed pipeline.
//!
//! This module contains all the concrete filter implementations
//! that can be composed into a FilterPipeline.

pub mod already_watched;
pub mod author_block;
pub mod category_cap;
pub mod quality;

// Re-export for convenience
pub use already_watched::AlreadyWatchedFilter;
pub use author_block::AuthorBlockFilter;
pub use category_cap::CategoryCapFilter;
pub use quality::QualityFilter;
