//! Collaborative recall
//!
//! "Viewers who liked what you liked also liked these videos":
//! 1. Take the viewer's most recent likes (default 20)
//! 2. Find other viewers who liked any of them (default 50, most overlap first)
//! 3. Return published videos those viewers liked, most co-likes first,
//!    leaving out the videos the viewer already liked

use crate::strategy::RecallStrategy;
use crate::types::{RecallRequest, RecallSource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use store::{Video, VideoStore};
use tracing::{debug, instrument};

pub struct CollaborativeStrategy {
    store: Arc<dyn VideoStore>,

    /// How many recent likes seed the neighbourhood
    max_liked: usize,

    /// How many similar viewers contribute their likes
    max_similar_users: usize,
}

impl CollaborativeStrategy {
    pub fn new(store: Arc<dyn VideoStore>) -> Self {
        Self {
            store,
            max_liked: 20,
            max_similar_users: 50,
        }
    }

    /// Configure how many recent likes to start from (default: 20)
    pub fn with_max_liked(mut self, max: usize) -> Self {
        self.max_liked = max;
        self
    }

    /// Configure how many similar viewers to consult (default: 50)
    pub fn with_max_similar_users(mut self, max: usize) -> Self {
        self.max_similar_users = max;
        self
    }
}

#[async_trait]
impl RecallStrategy for CollaborativeStrategy {
    fn source(&self) -> RecallSource {
        RecallSource::Collaborative
    }

    fn applies_to(&self, request: &RecallRequest) -> bool {
        request.viewer_id.is_some()
    }

    #[instrument(skip(self, request), fields(viewer_id = ?request.viewer_id))]
    async fn recall(&self, request: &RecallRequest, quota: usize) -> Result<Vec<Video>> {
        let Some(viewer_id) = request.viewer_id else {
            return Ok(Vec::new());
        };

        let liked = self
            .store
            .recent_likes(viewer_id, self.max_liked)
            .await
            .context("Failed to load recent likes")?;
        if liked.is_empty() {
            debug!("Viewer {} has no likes yet", viewer_id);
            return Ok(Vec::new());
        }

        let similar_users = self
            .store
            .users_who_liked(&liked, viewer_id, self.max_similar_users)
            .await
            .context("Failed to find similar viewers")?;
        debug!("Found {} similar viewers", similar_users.len());
        if similar_users.is_empty() {
            return Ok(Vec::new());
        }

        let videos = self
            .store
            .videos_liked_by(&similar_users, &liked, quota)
            .await
            .context("Failed to load co-liked videos")?;
        debug!("Generated {} collaborative candidates", videos.len());
        Ok(videos)
    }
}
