//! Cache storage backends
//!
//! The primary store is redis; the in-process memory backend doubles as the
//! transparent fallback when the primary is unreachable.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;

/// Storage backend for serialized rate entries
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Store a value under a key with a TTL
    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Fetch a value, `None` on miss or expiry
    async fn fetch(&self, key: &str) -> Result<Option<String>>;

    /// Remove every key under a prefix, returning how many were removed
    async fn purge_prefix(&self, prefix: &str) -> Result<usize>;

    /// Liveness probe
    async fn ping(&self) -> Result<()>;
}

/// Redis primary backend
pub struct RedisBackend {
    client: redis::aio::ConnectionManager,
}

impl RedisBackend {
    /// Connect to redis; fails if the server is unreachable
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let connection = client.get_connection_manager().await?;
        Ok(Self { client: connection })
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.client.clone();
        // Redis returns () for SET operations, explicitly typed for clarity
        let (): () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<String>> {
        use redis::AsyncCommands;
        let mut conn = self.client.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn purge_prefix(&self, prefix: &str) -> Result<usize> {
        use redis::AsyncCommands;
        let mut conn = self.client.clone();
        let keys: Vec<String> = conn.keys(format!("{prefix}*")).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed = keys.len();
        let (): () = conn.del(keys).await?;
        Ok(removed)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.client.clone();
        let (): () = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// In-process fallback backend with per-entry expiry
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<FxHashMap<String, (String, DateTime<Utc>)>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries currently held (expired ones included until next sweep)
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let expires_at = Utc::now() + Duration::seconds(ttl_secs as i64);
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Utc::now() => Ok(Some(value.clone())),
            _ => Ok(None),
        }
    }

    async fn purge_prefix(&self, prefix: &str) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before - entries.len())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_put_fetch() {
        let backend = MemoryBackend::new();
        backend.put("fx:rate:EUR/USD", "{}", 60).await.unwrap();
        assert_eq!(
            backend.fetch("fx:rate:EUR/USD").await.unwrap(),
            Some("{}".to_string())
        );
        assert_eq!(backend.fetch("fx:rate:GBP/USD").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_backend_expiry() {
        let backend = MemoryBackend::new();
        backend.put("fx:rate:EUR/USD", "{}", 0).await.unwrap();
        assert_eq!(backend.fetch("fx:rate:EUR/USD").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_backend_purge_prefix() {
        let backend = MemoryBackend::new();
        backend.put("fx:rate:EUR/USD", "a", 60).await.unwrap();
        backend.put("fx:rate:GBP/USD", "b", 60).await.unwrap();
        backend.put("other:key", "c", 60).await.unwrap();

        let removed = backend.purge_prefix("fx:rate").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(backend.len().await, 1);
    }
}
