//! Background interest updates.
//!
//! Behavior events are applied to the (user, category) interest records by
//! a single worker task fed through a bounded queue:
//!
//! 1. Skip the event if its id was already applied
//! 2. Look up the video's category
//! 3. Create the record (`score = increment`) or smooth it
//!    (`score = min(1, 0.9 * score + increment)`)
//! 4. Write the record and the applied marker in one store call, then
//!    evict the user's cached feature
//!
//! Transient store errors are retried with backoff. A missing video, an
//! exhausted retry budget or a full queue sends the event to the
//! dead-letter list.
//!
//! The read-modify-write of step 3 takes no lock. Two events for the same
//! (user, category) applied concurrently by separate engines over one store
//! can lose an update.

use crate::retry::{with_retry, RetryConfig, RetryError};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use store::*;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Smoothing factor applied to the previous score
pub const INTEREST_DECAY: f64 = 0.9;

/// Next interest score after an event with the given increment.
pub fn smoothed_score(previous: Option<f64>, increment: f64) -> f64 {
    match previous {
        Some(score) => (INTEREST_DECAY * score + increment).min(1.0),
        None => increment.min(1.0),
    }
}

/// An event the worker gave up on.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub event_id: EventId,
    pub user_id: UserId,
    pub video_id: VideoId,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Result of applying one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Event id seen before
    Duplicate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterestConfig {
    pub queue_capacity: usize,
    pub retry: RetryConfig,
}

impl Default for InterestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            retry: RetryConfig::default(),
        }
    }
}

impl InterestConfig {
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

enum Job {
    Apply(BehaviorEvent),
    Flush(oneshot::Sender<()>),
}

type DeadLetters = Arc<Mutex<Vec<DeadLetter>>>;

fn push_dead_letter(dead_letters: &DeadLetters, event: &BehaviorEvent, reason: String) {
    error!(
        "Interest update for event {} (user {}, video {}) dead-lettered: {}",
        event.id, event.user_id, event.video_id, reason
    );
    if let Ok(mut letters) = dead_letters.lock() {
        letters.push(DeadLetter {
            event_id: event.id,
            user_id: event.user_id,
            video_id: event.video_id,
            reason,
            failed_at: Utc::now(),
        });
    }
}

/// Handle to the interest worker.
///
/// Must be created inside a Tokio runtime. Dropping every handle closes the
/// queue and lets the worker finish what is queued.
pub struct InterestUpdater {
    sender: mpsc::Sender<Job>,
    dead_letters: DeadLetters,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl InterestUpdater {
    /// Spawn the worker task.
    pub fn spawn(store: Arc<dyn VideoStore>, cache: Arc<dyn Cache>, config: InterestConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let dead_letters: DeadLetters = Arc::new(Mutex::new(Vec::new()));
        let worker = Worker {
            store,
            cache,
            retry: config.retry,
            dead_letters: dead_letters.clone(),
        };
        let handle = tokio::spawn(worker.run(receiver));
        info!(
            "Interest worker started (queue capacity {})",
            config.queue_capacity
        );

        Self {
            sender,
            dead_letters,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Queue an event without waiting. Returns false, and dead-letters the
    /// event, when the queue is full or closed.
    pub fn enqueue(&self, event: BehaviorEvent) -> bool {
        match self.sender.try_send(Job::Apply(event)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(Job::Apply(event))) => {
                push_dead_letter(&self.dead_letters, &event, "queue full".to_string());
                false
            }
            Err(mpsc::error::TrySendError::Closed(Job::Apply(event))) => {
                push_dead_letter(&self.dead_letters, &event, "queue closed".to_string());
                false
            }
            Err(_) => false,
        }
    }

    /// Wait until every event queued before this call has been handled.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(Job::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters
            .lock()
            .map(|letters| letters.clone())
            .unwrap_or_default()
    }

    /// Events currently waiting in the queue
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Drain the queue, then stop the worker.
    pub async fn shutdown(&self) {
        self.flush().await;
        let handle = self.worker.lock().ok().and_then(|mut worker| worker.take());
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
    }
}

struct Worker {
    store: Arc<dyn VideoStore>,
    cache: Arc<dyn Cache>,
    retry: RetryConfig,
    dead_letters: DeadLetters,
}

impl Worker {
    async fn run(self, mut receiver: mpsc::Receiver<Job>) {
        while let Some(job) = receiver.recv().await {
            match job {
                Job::Apply(event) => self.handle(&event).await,
                Job::Flush(ack) => {
                    let _ = ack.send(());
                }
            }
        }
        debug!("Interest worker stopped");
    }

    async fn handle(&self, event: &BehaviorEvent) {
        let result = with_retry(
            &self.retry,
            |e: &StoreError| !e.is_not_found(),
            || apply_event(self.store.as_ref(), event),
        )
        .await;

        match result {
            Ok(ApplyOutcome::Applied) => {
                debug!("Applied interest update for event {}", event.id);
                if let Err(e) = self.cache.delete(&keys::user_feature(event.user_id)).await {
                    warn!("User feature eviction for {} failed: {}", event.user_id, e);
                }
            }
            Ok(ApplyOutcome::Duplicate) => {
                debug!("Event {} already applied, skipping", event.id);
            }
            Err(RetryError::Permanent(e)) => {
                push_dead_letter(&self.dead_letters, event, e.to_string());
            }
            Err(e @ RetryError::Exhausted { .. }) => {
                push_dead_letter(&self.dead_letters, event, e.to_string());
            }
        }
    }
}

/// Apply one event to its interest record, at most once per event id.
pub async fn apply_event(store: &dyn VideoStore, event: &BehaviorEvent) -> StoreResult<ApplyOutcome> {
    if store.is_event_applied(event.id).await? {
        return Ok(ApplyOutcome::Duplicate);
    }

    let video = store.get_video(event.video_id).await?;
    let increment = event.action.interest_increment(event.completion);
    let now = Utc::now();

    let record = match store.get_interest(event.user_id, video.category_id).await? {
        Some(mut record) => {
            record.score = smoothed_score(Some(record.score), increment);
            record.updated_at = now;
            record
        }
        None => InterestRecord {
            user_id: event.user_id,
            category_id: video.category_id,
            score: smoothed_score(None, increment),
            weight: 1.0,
            view_count: 0,
            like_count: 0,
            updated_at: now,
        },
    };
    let record = match event.action {
        ActionType::View => InterestRecord {
            view_count: record.view_count + 1,
            ..record
        },
        ActionType::Like => InterestRecord {
            like_count: record.like_count + 1,
            ..record
        },
        _ => record,
    };

    // A concurrent apply of the same event may have won since the check above
    if !store.apply_interest(&record, event.id).await? {
        return Ok(ApplyOutcome::Duplicate);
    }
    Ok(ApplyOutcome::Applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::create_test_store;
    use std::time::Duration;

    fn fast_config() -> InterestConfig {
        InterestConfig::default().with_retry(
            RetryConfig::default()
                .with_max_retries(2)
                .with_initial_backoff(Duration::from_millis(5))
                .with_jitter(false),
        )
    }

    #[test]
    fn test_smoothing_converges_without_exceeding_one() {
        let mut score = smoothed_score(None, 0.8);
        assert_eq!(score, 0.8);
        for _ in 0..100 {
            let next = smoothed_score(Some(score), 0.8);
            assert!(next >= score);
            assert!(next <= 1.0);
            score = next;
        }
        assert_eq!(score, 1.0);
        assert!((smoothed_score(Some(0.5), 0.1) - 0.55).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_apply_creates_then_smooths() {
        let store = create_test_store();
        let like = BehaviorEvent::new(1, 1, ActionType::Like);
        assert_eq!(apply_event(&store, &like).await.unwrap(), ApplyOutcome::Applied);

        let record = store.get_interest(1, 1).await.unwrap().unwrap();
        assert!((record.score - 0.3).abs() < 1e-12);
        assert_eq!(record.like_count, 1);
        assert_eq!(record.weight, 1.0);

        let view = BehaviorEvent::new(1, 1, ActionType::View).with_watch(20.0, 0.5);
        apply_event(&store, &view).await.unwrap();
        let record = store.get_interest(1, 1).await.unwrap().unwrap();
        assert!((record.score - (0.9 * 0.3 + 0.05)).abs() < 1e-12);
        assert_eq!(record.view_count, 1);
    }

    #[tokio::test]
    async fn test_duplicate_event_applied_once() {
        let store = create_test_store();
        let event = BehaviorEvent::new(1, 1, ActionType::Share);
        apply_event(&store, &event).await.unwrap();
        assert_eq!(
            apply_event(&store, &event).await.unwrap(),
            ApplyOutcome::Duplicate
        );
        let record = store.get_interest(1, 1).await.unwrap().unwrap();
        assert!((record.score - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_failed_write_retried_applies_once() {
        let store = create_test_store();
        let event = BehaviorEvent::new(1, 1, ActionType::Like);

        store.inject_failure("apply_interest");
        assert!(apply_event(&store, &event).await.is_err());
        assert!(store.get_interest(1, 1).await.unwrap().is_none());
        assert!(!store.is_event_applied(event.id).await.unwrap());
        store.clear_failures();

        assert_eq!(apply_event(&store, &event).await.unwrap(), ApplyOutcome::Applied);
        assert_eq!(
            apply_event(&store, &event).await.unwrap(),
            ApplyOutcome::Duplicate
        );
        let record = store.get_interest(1, 1).await.unwrap().unwrap();
        assert!((record.score - 0.3).abs() < 1e-12);
        assert_eq!(record.like_count, 1);
    }

    #[tokio::test]
    async fn test_worker_applies_and_evicts_feature() {
        let store = Arc::new(create_test_store());
        let cache = Arc::new(MemoryCache::new());
        cache
            .set_ex(&keys::user_feature(1), "{}", Duration::from_secs(60))
            .await
            .unwrap();
        let updater = InterestUpdater::spawn(store.clone(), cache.clone(), fast_config());

        let event = BehaviorEvent::new(1, 2, ActionType::Favorite);
        assert!(updater.enqueue(event.clone()));
        assert!(updater.enqueue(event));
        updater.flush().await;

        let record = store.get_interest(1, 2).await.unwrap().unwrap();
        assert!((record.score - 0.6).abs() < 1e-12);
        assert!(!cache.exists(&keys::user_feature(1)).await.unwrap());
        assert!(updater.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_missing_video_is_dead_lettered_without_retry() {
        let store = Arc::new(create_test_store());
        let updater = InterestUpdater::spawn(store, Arc::new(MemoryCache::new()), fast_config());

        let event = BehaviorEvent::new(1, 999, ActionType::Like);
        updater.enqueue(event.clone());
        updater.flush().await;

        let letters = updater.dead_letters();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].event_id, event.id);
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_dead_lettered() {
        let store = Arc::new(create_test_store());
        store.inject_failure("apply_interest");
        let updater =
            InterestUpdater::spawn(store.clone(), Arc::new(MemoryCache::new()), fast_config());

        let event = BehaviorEvent::new(1, 1, ActionType::Like);
        updater.enqueue(event.clone());
        updater.flush().await;

        assert_eq!(updater.dead_letters().len(), 1);
        assert!(!store.is_event_applied(event.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_full_queue_dead_letters_instead_of_blocking() {
        let store = Arc::new(create_test_store());
        // The worker can't run before the test yields, so only one job fits
        let config = InterestConfig::default()
            .with_queue_capacity(1)
            .with_retry(
                RetryConfig::default()
                    .with_max_retries(1)
                    .with_initial_backoff(Duration::from_millis(200))
                    .with_jitter(false),
            );
        let updater = InterestUpdater::spawn(store, Arc::new(MemoryCache::new()), config);

        let accepted: usize = (0..5)
            .map(|_| updater.enqueue(BehaviorEvent::new(1, 1, ActionType::View)))
            .filter(|ok| *ok)
            .count();
        assert!(accepted < 5);
        assert!(updater.dead_letters().len() >= 5 - accepted);
    }
}
