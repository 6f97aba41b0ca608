//! Error types for the store crate.
//!
//! Three families, matching the three things this crate talks to:
//! - `StoreError` for the persistent store
//! - `CacheError` for the key-value cache
//! - `SeedError` for loading seed data from disk

use thiserror::Error;

/// Errors returned by a `VideoStore`.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Referenced row does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Backend could not serve the query (connection loss, timeout, ...)
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Errors returned by a `Cache`.
///
/// Callers in the pipeline never propagate these: a failing cache degrades
/// to the store path.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Unavailable(err.to_string())
    }
}

/// Errors that can occur while loading seed data files.
#[derive(Error, Debug)]
pub enum SeedError {
    /// File could not be found or opened
    #[error("Failed to open file: {path}")]
    FileNotFound { path: String },

    /// I/O error occurred while reading file
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Line in a seed file couldn't be parsed
    #[error("Parse error at line {line} in {file}: {reason}")]
    ParseError {
        file: String,
        line: usize,
        reason: String,
    },

    /// Referenced entity doesn't exist (e.g., event for a non-existent video)
    #[error("Missing reference: {entity} with id {id}")]
    MissingReference { entity: String, id: u64 },
}

/// Convenience alias for store results
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Convenience alias for cache results
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Convenience alias for seed loading results
pub type Result<T> = std::result::Result<T, SeedError>;
