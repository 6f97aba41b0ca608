//! Retry with exponential backoff and jitter.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Add ±30% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    #[error("non-retryable failure: {0}")]
    Permanent(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Permanent(e) => e,
        }
    }
}

/// Run `f` until it succeeds, fails with an error `is_retryable` rejects,
/// or `max_retries` retries are spent.
pub async fn with_retry<F, Fut, T, E, R>(
    config: &RetryConfig,
    is_retryable: R,
    mut f: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0;
    let mut backoff = config.initial_backoff;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !is_retryable(&e) => return Err(RetryError::Permanent(e)),
            Err(e) => {
                attempt += 1;
                if attempt > config.max_retries {
                    warn!("Max retries ({}) reached: {}", config.max_retries, e);
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }

                let delay = calculate_backoff(backoff, config.jitter);
                warn!(
                    "Retry attempt {}/{} after {}, waiting {:?}",
                    attempt, config.max_retries, e, delay
                );
                tokio::time::sleep(delay).await;

                backoff = Duration::from_millis(
                    (backoff.as_millis() as f64 * config.backoff_multiplier)
                        .min(config.max_backoff.as_millis() as f64) as u64,
                );
            }
        }
    }
}

fn calculate_backoff(base: Duration, jitter: bool) -> Duration {
    if jitter {
        let factor = 1.0 + rand::rng().random_range(-0.3..0.3);
        Duration::from_millis((base.as_millis() as f64 * factor) as u64)
    } else {
        base
    }
}
