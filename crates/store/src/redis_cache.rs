//! Redis-backed `Cache`.
//!
//! Key layout lives in `traits::keys`:
//! - feature:user:{id}          → JSON user feature, TTL 1h
//! - feature:video:{id}         → JSON video feature, TTL 30m
//! - recall:hot:24h             → sorted set of hot video ids, TTL 1h
//! - history:watched:{id}       → set of watched video ids, TTL 7d
//! - history:recommended:{id}   → set of recommended video ids, TTL 24h
//! - history:blocked:{id}       → set of blocked author ids

use crate::error::CacheResult;
use crate::traits::Cache;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Redis accepts whole seconds; sub-second TTLs round up to one second.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Cache layer over a shared Redis connection manager.
#[derive(Clone)]
pub struct RedisCache {
    client: Arc<ConnectionManager>,
}

impl RedisCache {
    /// Connect to Redis at `redis_url`.
    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        debug!("Connected to Redis at {}", redis_url);
        Ok(Self {
            client: Arc::new(manager),
        })
    }

    /// Ping Redis to check connection health
    pub async fn ping(&self) -> CacheResult<()> {
        redis::cmd("PING")
            .query_async::<_, String>(&mut self.conn())
            .await
            .map_err(|e| {
                warn!("Redis PING failed: {}", e);
                e
            })?;
        Ok(())
    }

    fn conn(&self) -> ConnectionManager {
        self.client.as_ref().clone()
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let value = redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut self.conn())
            .await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        redis::cmd("SETEX")
            .arg(key)
            .arg(ttl_secs(ttl))
            .arg(value)
            .query_async::<_, ()>(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let exists = redis::cmd("EXISTS")
            .arg(key)
            .query_async::<_, bool>(&mut self.conn())
            .await?;
        Ok(exists)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs(ttl))
            .query_async::<_, ()>(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn set_add(&self, key: &str, members: &[String]) -> CacheResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        redis::cmd("SADD")
            .arg(key)
            .arg(members)
            .query_async::<_, ()>(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> CacheResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        redis::cmd("SREM")
            .arg(key)
            .arg(members)
            .query_async::<_, ()>(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn set_is_member(&self, key: &str, member: &str) -> CacheResult<bool> {
        let is_member = redis::cmd("SISMEMBER")
            .arg(key)
            .arg(member)
            .query_async::<_, bool>(&mut self.conn())
            .await?;
        Ok(is_member)
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        let members = redis::cmd("SMEMBERS")
            .arg(key)
            .query_async::<_, Vec<String>>(&mut self.conn())
            .await?;
        Ok(members)
    }

    async fn zset_replace(
        &self,
        key: &str,
        members: &[(String, f64)],
        ttl: Duration,
    ) -> CacheResult<()> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("DEL").arg(key).ignore();
        if !members.is_empty() {
            pipe.cmd("ZADD").arg(key);
            for (member, score) in members {
                pipe.arg(*score).arg(member);
            }
            pipe.ignore();
            pipe.cmd("EXPIRE").arg(key).arg(ttl_secs(ttl)).ignore();
        }
        pipe.query_async::<_, ()>(&mut self.conn()).await?;
        debug!("Replaced sorted set {} with {} members", key, members.len());
        Ok(())
    }

    async fn zset_rev_range(&self, key: &str, limit: usize) -> CacheResult<Vec<(String, f64)>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let members = redis::cmd("ZREVRANGE")
            .arg(key)
            .arg(0)
            .arg(limit as isize - 1)
            .arg("WITHSCORES")
            .query_async::<_, Vec<(String, f64)>>(&mut self.conn())
            .await?;
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_rounds_up_to_one_second() {
        assert_eq!(ttl_secs(Duration::from_millis(10)), 1);
        assert_eq!(ttl_secs(Duration::from_secs(3600)), 3600);
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        assert!(RedisCache::connect("not-a-redis-url").await.is_err());
    }
}
