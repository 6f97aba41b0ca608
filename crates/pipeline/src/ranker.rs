//! Multi-objective ranking.
//!
//! Each candidate gets five sub-scores in [0, 1] that are blended with fixed
//! weights:
//!
//! | Sub-score  | Weight |
//! |------------|--------|
//! | CTR        | 0.30   |
//! | Completion | 0.25   |
//! | Engagement | 0.25   |
//! | Hot        | 0.10   |
//! | Freshness  | 0.10   |
//!
//! A missing user or video feature contributes zero to the terms that read
//! it. Attributes carried by the video itself (quality, plays, duration, hot
//! score, publish time) are always available.

use crate::decay::Decay;
use crate::features::{engagement_rates, Features, UserFeature, VideoFeature};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use sources::{Candidate, RecallSource};
use std::cmp::Ordering;
use std::collections::HashMap;
use store::{CategoryId, Video, VideoId};
use tracing::{debug, instrument};

/// Blend weights of the sub-scores; they sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankWeights {
    pub ctr: f64,
    pub completion: f64,
    pub engagement: f64,
    pub hot: f64,
    pub freshness: f64,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            ctr: 0.30,
            completion: 0.25,
            engagement: 0.25,
            hot: 0.10,
            freshness: 0.10,
        }
    }
}

/// The per-objective scores behind a composite score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub ctr: f64,
    pub completion: f64,
    pub engagement: f64,
    pub hot: f64,
    pub freshness: f64,
}

/// A ranked candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub video: Video,
    pub source: RecallSource,
    /// Composite score in [0, 1]
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

impl ScoredCandidate {
    pub fn id(&self) -> VideoId {
        self.video.id
    }
}

/// Order by score descending, then newer publish time, then smaller id.
pub fn rank_order(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.video.published_at.cmp(&a.video.published_at))
        .then_with(|| a.video.id.cmp(&b.video.id))
}

fn minmax(value: f64, min: f64, max: f64) -> f64 {
    ((value - min) / (max - min)).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Default)]
pub struct Ranker {
    weights: RankWeights,
}

impl Ranker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(mut self, weights: RankWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Score and sort the pool.
    pub fn rank(&self, candidates: Vec<Candidate>, features: &Features) -> Vec<ScoredCandidate> {
        self.rank_at(candidates, features, Utc::now())
    }

    /// Score and sort the pool as of `now`.
    #[instrument(skip_all, fields(candidates = candidates.len()))]
    pub fn rank_at(
        &self,
        candidates: Vec<Candidate>,
        features: &Features,
        now: DateTime<Utc>,
    ) -> Vec<ScoredCandidate> {
        let user = features.user.as_ref();
        let mut ranked: Vec<ScoredCandidate> = candidates
            .into_par_iter()
            .map(|candidate| {
                let video_feature = features.video(candidate.id());
                let breakdown = score_breakdown(&candidate.video, user, video_feature, now);
                ScoredCandidate {
                    score: self.composite(&breakdown),
                    video: candidate.video,
                    source: candidate.source,
                    breakdown,
                }
            })
            .collect();

        ranked.par_sort_by(rank_order);
        debug!("Ranked {} candidates", ranked.len());
        ranked
    }

    fn composite(&self, b: &ScoreBreakdown) -> f64 {
        let w = &self.weights;
        (w.ctr * b.ctr
            + w.completion * b.completion
            + w.engagement * b.engagement
            + w.hot * b.hot
            + w.freshness * b.freshness)
            .clamp(0.0, 1.0)
    }
}

/// Compute the five sub-scores of one video.
pub fn score_breakdown(
    video: &Video,
    user: Option<&UserFeature>,
    video_feature: Option<&VideoFeature>,
    now: DateTime<Utc>,
) -> ScoreBreakdown {
    let interest = user
        .and_then(|u| u.interest(video.category_id))
        .unwrap_or(0.0);
    let plays = video.play_count as f64;
    let ctr = 0.5
        + 0.2 * minmax(video.quality_score, 0.0, 100.0)
        + 0.3 * (plays / (plays + 1000.0))
        + 0.5 * interest;

    let length_factor = if video.duration > 300 {
        300.0 / video.duration as f64
    } else {
        1.0
    };
    let finish_rate = video_feature.map_or(0.0, |f| f.finish_rate);
    let viewer_completion = user.map_or(0.0, |u| u.avg_completion);
    let completion = 0.5 + 0.3 * length_factor + 0.4 * finish_rate + 0.3 * viewer_completion;

    // Without a cached feature the rates come straight from the counters
    let (like_rate, comment_rate, share_rate) = video_feature.map_or_else(
        || engagement_rates(video),
        |f| (f.like_rate, f.comment_rate, f.share_rate),
    );
    let engagement = 0.4 * like_rate + 0.3 * comment_rate + 0.3 * share_rate;

    ScoreBreakdown {
        ctr: ctr.clamp(0.0, 1.0),
        completion: completion.clamp(0.0, 1.0),
        engagement: engagement.clamp(0.0, 1.0),
        hot: minmax(video.hot_score, 0.0, 1000.0),
        freshness: Decay::RANK_FRESHNESS.apply(video.age_hours(now)),
    }
}

/// Per-category cap applied by `apply_diversity`
const DIVERSITY_CATEGORY_CAP: usize = 3;

/// Thin out a ranked list so no category dominates.
///
/// A `ratio` of zero or less disables the pass. Otherwise a candidate is
/// dropped once its category already appears three times among the kept
/// candidates. Order is preserved.
pub fn apply_diversity(ranked: Vec<ScoredCandidate>, ratio: f64) -> Vec<ScoredCandidate> {
    if ratio <= 0.0 {
        return ranked;
    }
    let mut seen: HashMap<CategoryId, usize> = HashMap::new();
    ranked
        .into_iter()
        .filter(|candidate| {
            let count = seen.entry(candidate.video.category_id).or_insert(0);
            if *count >= DIVERSITY_CATEGORY_CAP {
                false
            } else {
                *count += 1;
                true
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::compute_video_feature;
    use crate::test_support::*;
    use chrono::Duration;

    fn features_for(videos: &[Video], user: Option<UserFeature>, now: DateTime<Utc>) -> Features {
        Features {
            user,
            videos: videos
                .iter()
                .map(|v| (v.id, compute_video_feature(v, None, now)))
                .collect(),
        }
    }

    fn candidates(videos: &[Video]) -> Vec<Candidate> {
        videos
            .iter()
            .cloned()
            .map(|v| Candidate::new(v, RecallSource::Hot))
            .collect()
    }

    #[test]
    fn test_scores_are_bounded() {
        let now = Utc::now();
        let mut extreme = video(1, 1);
        extreme.quality_score = 500.0;
        extreme.hot_score = 10_000.0;
        extreme.play_count = 10;
        extreme.like_count = 1_000;
        extreme.comment_count = 1_000;
        extreme.share_count = 1_000;
        let mut user_feature = user_feature(1);
        user_feature.avg_completion = 1.0;
        user_feature.interests.insert(1, 1.0);

        let videos = vec![extreme, video(2, 2)];
        let features = features_for(&videos, Some(user_feature), now);
        let ranked = Ranker::new().rank_at(candidates(&videos), &features, now);

        for candidate in &ranked {
            let b = candidate.breakdown;
            for sub in [b.ctr, b.completion, b.engagement, b.hot, b.freshness] {
                assert!((0.0..=1.0).contains(&sub));
            }
            assert!((0.0..=1.0).contains(&candidate.score));
        }
    }

    #[test]
    fn test_zero_play_video() {
        let now = Utc::now();
        let mut v = video(1, 1);
        v.play_count = 0;
        v.like_count = 0;
        v.quality_score = 0.0;
        let feature = compute_video_feature(&v, None, now);
        let b = score_breakdown(&v, None, Some(&feature), now);
        assert_eq!(b.engagement, 0.0);
        // only the constant remains: no quality, no plays, no interest
        assert_eq!(b.ctr, 0.5);
    }

    #[test]
    fn test_missing_features_fall_back_to_counters() {
        let now = Utc::now();
        let mut v = video(1, 1);
        v.duration = 600;
        let b = score_breakdown(&v, None, None, now);
        // 10 likes, 2 comments and 1 share over 100 plays
        assert!((b.engagement - (0.4 * 0.1 + 0.3 * 0.02 + 0.3 * 0.01)).abs() < 1e-12);
        // no finish rate and no viewer history
        assert!((b.completion - (0.5 + 0.3 * 0.5)).abs() < 1e-12);

        let cached = compute_video_feature(&v, None, now);
        let with_feature = score_breakdown(&v, None, Some(&cached), now);
        assert!((with_feature.engagement - b.engagement).abs() < 1e-12);

        v.play_count = 0;
        assert_eq!(score_breakdown(&v, None, None, now).engagement, 0.0);
    }

    #[test]
    fn test_interest_raises_ctr() {
        let now = Utc::now();
        let v = video(1, 7);
        let mut viewer = user_feature(1);
        let plain = score_breakdown(&v, Some(&viewer), None, now).ctr;
        viewer.interests.insert(7, 0.2);
        let boosted = score_breakdown(&v, Some(&viewer), None, now).ctr;
        assert!(boosted > plain);
    }

    #[test]
    fn test_sorted_descending_with_deterministic_ties() {
        let now = Utc::now();
        let mut videos: Vec<Video> = (1..=4).map(|id| video(id, 1)).collect();
        // identical attributes except publish time
        for v in &mut videos {
            v.published_at = now - Duration::hours(2);
        }
        videos[3].published_at = now - Duration::hours(1);
        videos[2].hot_score = 900.0;

        let features = features_for(&videos, None, now);
        let ranked = Ranker::new().rank_at(candidates(&videos), &features, now);
        let ids: Vec<_> = ranked.iter().map(|c| c.id()).collect();

        assert_eq!(ids[0], 3);
        assert_eq!(ids[1], 4);
        // 1 and 2 tie on everything: smaller id first
        assert_eq!(&ids[2..], &[1, 2]);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_apply_diversity() {
        let now = Utc::now();
        let videos: Vec<Video> = (1..=6).map(|id| video(id, if id <= 4 { 1 } else { 2 })).collect();
        let ranked = Ranker::new().rank_at(candidates(&videos), &Features::default(), now);

        assert_eq!(apply_diversity(ranked.clone(), 0.0).len(), 6);
        let diverse = apply_diversity(ranked, 0.5);
        assert_eq!(diverse.len(), 5);
        assert_eq!(diverse.iter().filter(|c| c.video.category_id == 1).count(), 3);
    }
}
