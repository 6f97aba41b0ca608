//! New-video recall: anything published within the last hour, newest first.

use crate::strategy::RecallStrategy;
use crate::types::{RecallRequest, RecallSource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use store::{Video, VideoOrder, VideoQuery, VideoStore};

pub struct NewVideoStrategy {
    store: Arc<dyn VideoStore>,
    window: chrono::Duration,
}

impl NewVideoStrategy {
    pub fn new(store: Arc<dyn VideoStore>) -> Self {
        Self {
            store,
            window: chrono::Duration::hours(1),
        }
    }

    /// Configure the publication window (default: 1 hour)
    pub fn with_window(mut self, window: chrono::Duration) -> Self {
        self.window = window;
        self
    }
}

#[async_trait]
impl RecallStrategy for NewVideoStrategy {
    fn source(&self) -> RecallSource {
        RecallSource::New
    }

    async fn recall(&self, _request: &RecallRequest, quota: usize) -> Result<Vec<Video>> {
        let query = VideoQuery::published(quota)
            .since(Utc::now() - self.window)
            .order_by(VideoOrder::NewestFirst);
        self.store
            .query_videos(&query)
            .await
            .context("Failed to query new videos")
    }
}
