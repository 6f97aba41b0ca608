//! Follow recall: newest videos from authors the viewer follows.
//! Only runs for the follow scene.

use crate::strategy::RecallStrategy;
use crate::types::{RecallRequest, RecallSource, Scene};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use store::{Video, VideoOrder, VideoQuery, VideoStore};
use tracing::debug;

pub struct FollowStrategy {
    store: Arc<dyn VideoStore>,
    max_authors: usize,
}

impl FollowStrategy {
    pub fn new(store: Arc<dyn VideoStore>) -> Self {
        Self {
            store,
            max_authors: 100,
        }
    }

    /// Configure how many followed authors to consult (default: 100)
    pub fn with_max_authors(mut self, max: usize) -> Self {
        self.max_authors = max;
        self
    }
}

#[async_trait]
impl RecallStrategy for FollowStrategy {
    fn source(&self) -> RecallSource {
        RecallSource::Follow
    }

    fn applies_to(&self, request: &RecallRequest) -> bool {
        request.scene == Scene::Follow && request.viewer_id.is_some()
    }

    fn quota(&self, limit: usize) -> usize {
        (limit / 2).max(1)
    }

    async fn recall(&self, request: &RecallRequest, quota: usize) -> Result<Vec<Video>> {
        let Some(viewer_id) = request.viewer_id else {
            return Ok(Vec::new());
        };

        let authors = self
            .store
            .followed_authors(viewer_id, self.max_authors)
            .await
            .context("Failed to load followed authors")?;
        if authors.is_empty() {
            debug!("Viewer {} follows nobody", viewer_id);
            return Ok(Vec::new());
        }

        let query = VideoQuery::published(quota)
            .by_owners(authors)
            .order_by(VideoOrder::NewestFirst);
        self.store
            .query_videos(&query)
            .await
            .context("Failed to query followed authors' videos")
    }
}
