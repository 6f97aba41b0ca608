//! Time decay of a video's relevance with age.
//!
//! Both freshness signals go through `Decay` so their shapes are tuned in
//! one place: the feature uses a hyperbolic curve, the ranker a half-life.

use std::f64::consts::LN_2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decay {
    /// `1 / (1 + hours / scale_hours)`
    Hyperbolic { scale_hours: f64 },
    /// `exp(-ln2 * hours / half_life_hours)`
    HalfLife { half_life_hours: f64 },
}

impl Decay {
    /// Freshness stored on the video feature
    pub const FEATURE_FRESHNESS: Decay = Decay::Hyperbolic { scale_hours: 24.0 };

    /// Freshness sub-score of the ranker
    pub const RANK_FRESHNESS: Decay = Decay::HalfLife {
        half_life_hours: 24.0,
    };

    /// Decay factor in (0, 1] for an age in hours; negative ages count as 0.
    pub fn apply(&self, age_hours: f64) -> f64 {
        let hours = age_hours.max(0.0);
        match *self {
            Decay::Hyperbolic { scale_hours } => 1.0 / (1.0 + hours / scale_hours),
            Decay::HalfLife { half_life_hours } => (-LN_2 * hours / half_life_hours).exp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_at_publish_time() {
        assert_eq!(Decay::FEATURE_FRESHNESS.apply(0.0), 1.0);
        assert_eq!(Decay::RANK_FRESHNESS.apply(0.0), 1.0);
        assert_eq!(Decay::RANK_FRESHNESS.apply(-5.0), 1.0);
    }

    #[test]
    fn test_reference_points() {
        assert!((Decay::FEATURE_FRESHNESS.apply(24.0) - 0.5).abs() < 1e-12);
        assert!((Decay::RANK_FRESHNESS.apply(24.0) - 0.5).abs() < 1e-12);
        assert!((Decay::RANK_FRESHNESS.apply(48.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_strictly_decreasing_and_positive() {
        for decay in [Decay::FEATURE_FRESHNESS, Decay::RANK_FRESHNESS] {
            let mut previous = decay.apply(0.0);
            for hour in 1..=240 {
                let value = decay.apply(hour as f64);
                assert!(value < previous);
                assert!(value > 0.0);
                previous = value;
            }
        }
    }
}
