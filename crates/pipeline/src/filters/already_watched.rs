//! Filter to remove videos the viewer watched recently.
//!
//! This is the first filter in the pipeline, as there's no point in
//! recommending a video the viewer has just seen.

use crate::ranker::ScoredCandidate;
use crate::traits::{Filter, FilterContext};
use anyhow::Result;

/// Removes candidates present in the viewer's watched set.
pub struct AlreadyWatchedFilter;

impl Filter for AlreadyWatchedFilter {
    fn name(&self) -> &str {
        "AlreadyWatchedFilter"
    }

    fn apply(
        &self,
        candidates: Vec<ScoredCandidate>,
        context: &FilterContext,
    ) -> Result<Vec<ScoredCandidate>> {
        let filtered: Vec<ScoredCandidate> = candidates
            .into_iter()
            .filter(|candidate| !context.watched.contains(&candidate.id()))
            .collect();
        Ok(filtered)
    }
}
