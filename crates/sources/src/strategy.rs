//! The `RecallStrategy` seam.

use crate::types::{RecallRequest, RecallSource};
use anyhow::Result;
use async_trait::async_trait;
use store::Video;

/// One independent way of producing candidate videos.
///
/// A strategy is best-effort: the `Recaller` logs its errors and moves on,
/// so implementations should return `Err` rather than a partial result when
/// the store fails.
#[async_trait]
pub trait RecallStrategy: Send + Sync {
    /// Source tag stamped on every candidate this strategy produces
    fn source(&self) -> RecallSource;

    /// Whether this strategy runs for the request at all
    fn applies_to(&self, request: &RecallRequest) -> bool {
        let _ = request;
        true
    }

    /// How many videos to ask for out of a pool of `limit`
    fn quota(&self, limit: usize) -> usize {
        (limit / 4).max(1)
    }

    /// Produce up to `quota` videos in strategy-internal priority order.
    async fn recall(&self, request: &RecallRequest, quota: usize) -> Result<Vec<Video>>;
}
