//! Types shared by the recall strategies.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use store::{UserId, Video, VideoId};

/// Recommendation context requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scene {
    /// General personalized feed
    #[default]
    Feed,
    /// Feed of followed authors
    Follow,
    /// Hot list
    Hot,
}

impl fmt::Display for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scene::Feed => "feed",
            Scene::Follow => "follow",
            Scene::Hot => "hot",
        };
        f.write_str(name)
    }
}

impl FromStr for Scene {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "feed" => Ok(Scene::Feed),
            "follow" => Ok(Scene::Follow),
            "hot" => Ok(Scene::Hot),
            other => Err(format!("unknown scene: {other}")),
        }
    }
}

/// Which strategy produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecallSource {
    Collaborative,
    Content,
    Hot,
    Follow,
    New,
    Random,
}

impl RecallSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecallSource::Collaborative => "collaborative",
            RecallSource::Content => "content",
            RecallSource::Hot => "hot",
            RecallSource::Follow => "follow",
            RecallSource::New => "new",
            RecallSource::Random => "random",
        }
    }
}

/// A recalled video before scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub video: Video,
    /// First strategy that surfaced the video
    pub source: RecallSource,
}

impl Candidate {
    pub fn new(video: Video, source: RecallSource) -> Self {
        Self { video, source }
    }

    pub fn id(&self) -> VideoId {
        self.video.id
    }
}

/// Input of one recall pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecallRequest {
    /// `None` for anonymous viewers
    pub viewer_id: Option<UserId>,
    pub scene: Scene,
    /// Target pool size
    pub limit: usize,
}

impl RecallRequest {
    pub fn new(viewer_id: Option<UserId>, scene: Scene, limit: usize) -> Self {
        Self {
            viewer_id,
            scene,
            limit,
        }
    }
}

/// Per-source accounting of one recall pass, for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecallStats {
    /// Videos returned by each strategy before the merge
    pub per_source: HashMap<RecallSource, usize>,
    /// Strategies that errored or ran out of time
    pub failed: Vec<RecallSource>,
    /// Unique candidates after the merge
    pub total: usize,
}
