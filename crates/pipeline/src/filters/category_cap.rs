//! Filter to cap how many videos of one category a response carries.
//!
//! Stateful over the list it is given: it must run after every other
//! filter so the count is taken over the final survivors.

use crate::ranker::ScoredCandidate;
use crate::traits::{Filter, FilterContext};
use anyhow::Result;
use std::collections::HashMap;
use store::CategoryId;

pub struct CategoryCapFilter {
    max_per_category: usize,
}

impl CategoryCapFilter {
    pub fn new(max_per_category: usize) -> Self {
        Self { max_per_category }
    }
}

impl Filter for CategoryCapFilter {
    fn name(&self) -> &str {
        "CategoryCapFilter"
    }

    fn apply(
        &self,
        candidates: Vec<ScoredCandidate>,
        _context: &FilterContext,
    ) -> Result<Vec<ScoredCandidate>> {
        let mut counts: HashMap<CategoryId, usize> = HashMap::new();
        let filtered: Vec<ScoredCandidate> = candidates
            .into_iter()
            .filter(|c| {
                let count = counts.entry(c.video.category_id).or_insert(0);
                if *count < self.max_per_category {
                    *count += 1;
                    true
                } else {
                    false
                }
            })
            .collect();
        Ok(filtered)
    }
}
