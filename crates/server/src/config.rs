//! Engine configuration, read from `FEED_`-prefixed environment variables.
//!
//! A `.env` file in the working directory is loaded first when present.
//! Every field has a default, so an empty environment yields a working
//! engine over the seed data in `data/seed`.

use anyhow::{ensure, Context, Result};
use pipeline::{FeatureConfig, FilterConfig, InterestConfig, RetryConfig};
use serde::Deserialize;
use sources::RecallConfig;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_PREFIX: &str = "FEED_";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Largest page a caller may request
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    /// Recall pool size as a multiple of the page size
    #[serde(default = "default_recall_multiplier")]
    pub recall_multiplier: usize,

    #[serde(default = "default_recall_timeout_ms")]
    pub recall_timeout_ms: u64,

    /// Bound on each user or video feature lookup
    #[serde(default = "default_feature_timeout_ms")]
    pub feature_timeout_ms: u64,

    #[serde(default = "default_interest_queue_capacity")]
    pub interest_queue_capacity: usize,

    #[serde(default = "default_interest_max_retries")]
    pub interest_max_retries: u32,

    #[serde(default = "default_interest_backoff_ms")]
    pub interest_backoff_ms: u64,

    /// 0 disables the diversity pass
    #[serde(default)]
    pub ranker_diversity_ratio: f64,

    #[serde(default = "default_min_quality")]
    pub filter_min_quality: f64,

    #[serde(default = "default_max_per_category")]
    pub filter_max_per_category: usize,

    /// Use Redis as the cache when set, the in-process cache otherwise
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Directory holding the JSON-lines seed files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_max_page_size() -> usize {
    50
}

fn default_recall_multiplier() -> usize {
    10
}

fn default_recall_timeout_ms() -> u64 {
    800
}

fn default_feature_timeout_ms() -> u64 {
    300
}

fn default_interest_queue_capacity() -> usize {
    1024
}

fn default_interest_max_retries() -> u32 {
    3
}

fn default_interest_backoff_ms() -> u64 {
    100
}

fn default_min_quality() -> f64 {
    FilterConfig::default().min_quality
}

fn default_max_per_category() -> usize {
    FilterConfig::default().max_per_category
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/seed")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_page_size: default_max_page_size(),
            recall_multiplier: default_recall_multiplier(),
            recall_timeout_ms: default_recall_timeout_ms(),
            feature_timeout_ms: default_feature_timeout_ms(),
            interest_queue_capacity: default_interest_queue_capacity(),
            interest_max_retries: default_interest_max_retries(),
            interest_backoff_ms: default_interest_backoff_ms(),
            ranker_diversity_ratio: 0.0,
            filter_min_quality: default_min_quality(),
            filter_max_per_category: default_max_per_category(),
            redis_url: None,
            data_dir: default_data_dir(),
        }
    }
}

impl EngineConfig {
    /// Load `.env`, then read and validate the `FEED_*` variables.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let config: Self = envy::prefixed(ENV_PREFIX)
            .from_env()
            .context("Failed to read FEED_* environment")?;
        config.validate()?;
        Ok(config)
    }

    /// Build from explicit key/value pairs, as `from_env` would.
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::prefixed(ENV_PREFIX)
            .from_iter(pairs)
            .context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.max_page_size >= 1, "max_page_size must be at least 1");
        ensure!(
            self.recall_multiplier >= 1,
            "recall_multiplier must be at least 1"
        );
        ensure!(
            (0.0..=1.0).contains(&self.ranker_diversity_ratio),
            "ranker_diversity_ratio must be within [0, 1], got {}",
            self.ranker_diversity_ratio
        );
        ensure!(
            self.interest_queue_capacity >= 1,
            "interest_queue_capacity must be at least 1"
        );
        Ok(())
    }

    pub fn recall_config(&self) -> RecallConfig {
        RecallConfig::default().with_timeout(Duration::from_millis(self.recall_timeout_ms))
    }

    pub fn feature_config(&self) -> FeatureConfig {
        FeatureConfig::default().with_timeout(Duration::from_millis(self.feature_timeout_ms))
    }

    pub fn filter_config(&self) -> FilterConfig {
        FilterConfig::default()
            .with_min_quality(self.filter_min_quality)
            .with_max_per_category(self.filter_max_per_category)
    }

    pub fn interest_config(&self) -> InterestConfig {
        let retry = RetryConfig::default()
            .with_max_retries(self.interest_max_retries)
            .with_initial_backoff(Duration::from_millis(self.interest_backoff_ms));
        InterestConfig::default()
            .with_queue_capacity(self.interest_queue_capacity)
            .with_retry(retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(values: &[(&str, &str)]) -> Vec<(String, String)> {
        values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_environment_uses_defaults() {
        let config = EngineConfig::from_pairs(pairs(&[("PATH", "/usr/bin")])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_page_size, 50);
        assert_eq!(config.recall_multiplier, 10);
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_prefixed_overrides() {
        let config = EngineConfig::from_pairs(pairs(&[
            ("FEED_MAX_PAGE_SIZE", "20"),
            ("FEED_RECALL_TIMEOUT_MS", "250"),
            ("FEED_RANKER_DIVERSITY_RATIO", "0.5"),
            ("FEED_REDIS_URL", "redis://127.0.0.1:6379"),
            ("FEED_DATA_DIR", "/tmp/feed"),
            ("FEED_INTEREST_MAX_RETRIES", "5"),
        ]))
        .unwrap();

        assert_eq!(config.max_page_size, 20);
        assert_eq!(config.ranker_diversity_ratio, 0.5);
        assert_eq!(config.redis_url.as_deref(), Some("redis://127.0.0.1:6379"));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/feed"));
        assert_eq!(config.recall_config().timeout, Duration::from_millis(250));
        assert_eq!(config.interest_config().retry.max_retries, 5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(EngineConfig::from_pairs(pairs(&[("FEED_MAX_PAGE_SIZE", "lots")])).is_err());
        assert!(EngineConfig::from_pairs(pairs(&[("FEED_MAX_PAGE_SIZE", "0")])).is_err());
        assert!(
            EngineConfig::from_pairs(pairs(&[("FEED_RANKER_DIVERSITY_RATIO", "1.5")])).is_err()
        );
    }

    #[test]
    fn test_component_configs() {
        let config = EngineConfig {
            filter_min_quality: 50.0,
            filter_max_per_category: 3,
            feature_timeout_ms: 120,
            ..EngineConfig::default()
        };
        let filter = config.filter_config();
        assert_eq!(filter.min_quality, 50.0);
        assert_eq!(filter.max_per_category, 3);
        assert_eq!(config.feature_config().timeout, Duration::from_millis(120));
    }
}
