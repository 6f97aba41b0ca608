//! Filter to remove videos from authors the viewer blocked.

use crate::ranker::ScoredCandidate;
use crate::traits::{Filter, FilterContext};
use anyhow::Result;

pub struct AuthorBlockFilter;

impl Filter for AuthorBlockFilter {
    fn name(&self) -> &str {
        "AuthorBlockFilter"
    }

    fn apply(
        &self,
        candidates: Vec<ScoredCandidate>,
        context: &FilterContext,
    ) -> Result<Vec<ScoredCandidate>> {
        if context.blocked.is_empty() {
            return Ok(candidates);
        }
        Ok(candidates
            .into_iter()
            .filter(|c| !context.blocked.contains(&c.video.owner_id))
            .collect())
    }
}
