//! Filter to enforce minimum content quality.
//!
//! Keeps only published videos with a quality score at or above the floor
//! and a duration inside the allowed range.

use crate::ranker::ScoredCandidate;
use crate::traits::{Filter, FilterContext};
use anyhow::Result;

pub struct QualityFilter {
    min_quality: f64,
    min_duration: u32,
    max_duration: u32,
}

impl QualityFilter {
    /// Create a new QualityFilter.
    ///
    /// # Arguments
    /// * `min_quality` - Minimum quality score (typically 30)
    /// * `min_duration` / `max_duration` - Inclusive duration bounds in seconds
    pub fn new(min_quality: f64, min_duration: u32, max_duration: u32) -> Self {
        Self {
            min_quality,
            min_duration,
            max_duration,
        }
    }
}

impl Filter for QualityFilter {
    fn name(&self) -> &str {
        "QualityFilter"
    }

    fn apply(
        &self,
        candidates: Vec<ScoredCandidate>,
        _context: &FilterContext,
    ) -> Result<Vec<ScoredCandidate>> {
        let filtered: Vec<ScoredCandidate> = candidates
            .into_iter()
            .filter(|c| {
                let video = &c.video;
                video.is_published()
                    && video.quality_score >= self.min_quality
                    && (self.min_duration..=self.max_duration).contains(&video.duration)
            })
            .collect();

        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::scored;
    use store::VideoStatus;

    #[test]
    fn test_quality_filter() {
        let mut low = scored(2, 1);
        low.video.quality_score = 29.9;
        let mut draft = scored(3, 1);
        draft.video.status = VideoStatus::Pending;
        let mut too_short = scored(4, 1);
        too_short.video.duration = 2;
        let mut too_long = scored(5, 1);
        too_long.video.duration = 3601;
        let mut edge = scored(6, 1);
        edge.video.quality_score = 30.0;
        edge.video.duration = 3600;

        let candidates = vec![scored(1, 1), low, draft, too_short, too_long, edge];
        let filtered = QualityFilter::new(30.0, 3, 3600)
            .apply(candidates, &FilterContext::anonymous())
            .unwrap();

        let ids: Vec<_> = filtered.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![1, 6]);
    }
}
