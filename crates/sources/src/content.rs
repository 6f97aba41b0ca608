//! Content recall: hottest published videos in the viewer's top interest
//! categories.

use crate::strategy::RecallStrategy;
use crate::types::{RecallRequest, RecallSource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use store::{CategoryId, Video, VideoOrder, VideoQuery, VideoStore};
use tracing::debug;

pub struct ContentStrategy {
    store: Arc<dyn VideoStore>,
    max_categories: usize,
}

impl ContentStrategy {
    pub fn new(store: Arc<dyn VideoStore>) -> Self {
        Self {
            store,
            max_categories: 5,
        }
    }

    /// Configure how many interest categories to draw from (default: 5)
    pub fn with_max_categories(mut self, max: usize) -> Self {
        self.max_categories = max;
        self
    }
}

#[async_trait]
impl RecallStrategy for ContentStrategy {
    fn source(&self) -> RecallSource {
        RecallSource::Content
    }

    fn applies_to(&self, request: &RecallRequest) -> bool {
        request.viewer_id.is_some()
    }

    async fn recall(&self, request: &RecallRequest, quota: usize) -> Result<Vec<Video>> {
        let Some(viewer_id) = request.viewer_id else {
            return Ok(Vec::new());
        };

        let categories: Vec<CategoryId> = self
            .store
            .top_interests(viewer_id, self.max_categories)
            .await
            .context("Failed to load interest categories")?
            .into_iter()
            .map(|record| record.category_id)
            .collect();
        if categories.is_empty() {
            debug!("Viewer {} has no interest records", viewer_id);
            return Ok(Vec::new());
        }

        let query = VideoQuery::published(quota)
            .in_categories(categories)
            .order_by(VideoOrder::HotDesc);
        self.store
            .query_videos(&query)
            .await
            .context("Failed to query videos by category")
    }
}
