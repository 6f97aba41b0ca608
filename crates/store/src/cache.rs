//! In-memory `Cache` implementation.
//!
//! Mirrors the subset of Redis semantics the pipeline relies on: string
//! values with TTL, sets that are created on first `SADD` without a TTL,
//! sorted sets, and lazy expiry on access. Type mismatches fail like
//! Redis `WRONGTYPE` errors.

use crate::error::{CacheError, CacheResult};
use crate::traits::Cache;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum CacheValue {
    Str(String),
    Set(HashSet<String>),
    /// Kept sorted by score, highest first
    Sorted(Vec<(String, f64)>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: CacheValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: CacheValue, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::Unavailable(format!(
        "WRONGTYPE operation against key {} holding the wrong kind of value",
        key
    ))
}

/// Process-local cache with an availability switch for tests.
#[derive(Debug)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    available: AtomicBool,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: while unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> CacheResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }
    }

    /// Run `f` against the live entry for `key`, evicting it if expired.
    fn with_live<R>(&self, key: &str, f: impl FnOnce(&mut Entry) -> R) -> Option<R> {
        let now = Instant::now();
        let expired = match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => return Some(f(&mut entry)),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    /// Live set at `key`, created empty (no TTL) when missing or expired.
    fn with_set<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut HashSet<String>) -> R,
    ) -> CacheResult<R> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(CacheValue::Set(HashSet::new()), None));
        if entry.is_expired(now) {
            *entry = Entry::new(CacheValue::Set(HashSet::new()), None);
        }
        match &mut entry.value {
            CacheValue::Set(set) => Ok(f(set)),
            _ => Err(wrong_type(key)),
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check()?;
        match self.with_live(key, |entry| entry.value.clone()) {
            None => Ok(None),
            Some(CacheValue::Str(value)) => Ok(Some(value)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.check()?;
        self.entries.insert(
            key.to_string(),
            Entry::new(CacheValue::Str(value.to_string()), Some(ttl)),
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.check()?;
        self.entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.check()?;
        Ok(self.with_live(key, |_| ()).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        self.check()?;
        self.with_live(key, |entry| {
            entry.expires_at = Some(Instant::now() + ttl);
        });
        Ok(())
    }

    async fn set_add(&self, key: &str, members: &[String]) -> CacheResult<()> {
        self.check()?;
        if members.is_empty() {
            return Ok(());
        }
        self.with_set(key, |set| set.extend(members.iter().cloned()))
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> CacheResult<()> {
        self.check()?;
        let emptied = self
            .with_live(key, |entry| match &mut entry.value {
                CacheValue::Set(set) => {
                    for member in members {
                        set.remove(member);
                    }
                    Ok(set.is_empty())
                }
                _ => Err(wrong_type(key)),
            })
            .transpose()?
            .unwrap_or(false);
        // Redis drops a set once its last member is removed
        if emptied {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn set_is_member(&self, key: &str, member: &str) -> CacheResult<bool> {
        self.check()?;
        self.with_live(key, |entry| match &entry.value {
            CacheValue::Set(set) => Ok(set.contains(member)),
            _ => Err(wrong_type(key)),
        })
        .unwrap_or(Ok(false))
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        self.check()?;
        self.with_live(key, |entry| match &entry.value {
            CacheValue::Set(set) => Ok(set.iter().cloned().collect()),
            _ => Err(wrong_type(key)),
        })
        .unwrap_or(Ok(Vec::new()))
    }

    async fn zset_replace(
        &self,
        key: &str,
        members: &[(String, f64)],
        ttl: Duration,
    ) -> CacheResult<()> {
        self.check()?;
        if members.is_empty() {
            self.entries.remove(key);
            return Ok(());
        }
        let mut sorted = members.to_vec();
        sorted.sort_by(|a, b| b.1.total_cmp(&a.1));
        self.entries.insert(
            key.to_string(),
            Entry::new(CacheValue::Sorted(sorted), Some(ttl)),
        );
        Ok(())
    }

    async fn zset_rev_range(&self, key: &str, limit: usize) -> CacheResult<Vec<(String, f64)>> {
        self.check()?;
        self.with_live(key, |entry| match &entry.value {
            CacheValue::Sorted(members) => Ok(members.iter().take(limit).cloned().collect()),
            _ => Err(wrong_type(key)),
        })
        .unwrap_or(Ok(Vec::new()))
    }
}
