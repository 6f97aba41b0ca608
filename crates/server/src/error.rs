//! Errors surfaced by the feed engine.

use store::{StoreError, UserId, VideoId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Viewer {0} not found")]
    ViewerNotFound(UserId),

    #[error("Video {0} not found")]
    VideoNotFound(VideoId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A pipeline stage failed and the request could not be served
    #[error("{stage} stage failed")]
    Stage {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl EngineError {
    pub fn stage(stage: &'static str, source: anyhow::Error) -> Self {
        Self::Stage { stage, source }
    }

    /// True for errors caused by the caller rather than the backend.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest(_) | Self::ViewerNotFound(_) | Self::VideoNotFound(_)
        )
    }
}
