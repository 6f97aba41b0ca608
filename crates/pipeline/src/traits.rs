//! Core traits for the filtering pipeline.
//!
//! This module defines the Filter trait that allows composable,
//! extensible filters to be applied to ranked candidates.

use crate::ranker::ScoredCandidate;
use anyhow::Result;
use std::collections::HashSet;
use store::{UserId, VideoId};

/// Per-request state the filters consult.
///
/// Anonymous viewers get empty watched and blocked sets, which turns the
/// viewer-specific filters into no-ops.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterContext {
    pub viewer_id: Option<UserId>,
    /// Videos the viewer watched recently
    pub watched: HashSet<VideoId>,
    /// Authors the viewer blocked
    pub blocked: HashSet<UserId>,
}

impl FilterContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_viewer(viewer_id: UserId) -> Self {
        Self {
            viewer_id: Some(viewer_id),
            ..Default::default()
        }
    }
}

/// Core trait for filtering candidates.
///
/// ## Design Note
/// - `Send + Sync` allows filters to be shared across concurrent requests
/// - Filters take ownership of the Vec and return the survivors in their
///   original order
pub trait Filter: Send + Sync {
    /// Returns the name of this filter (for logging/debugging)
    fn name(&self) -> &str;

    /// Apply this filter to ranked candidates.
    fn apply(
        &self,
        candidates: Vec<ScoredCandidate>,
        context: &FilterContext,
    ) -> Result<Vec<ScoredCandidate>>;
}
