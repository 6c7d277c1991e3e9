use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use redis::{AsyncCommands, Client};

use crate::error::AppResult;

// TTLs per operation kind: trending changes fastest, per-movie facts slowest.
const SEARCH_TTL: u64 = 21_600; // 6 hours
const DETAILS_TTL: u64 = 86_400; // 24 hours
const POPULAR_TTL: u64 = 43_200; // 12 hours
const TRENDING_TTL: u64 = 7_200; // 2 hours

/// Deterministic cache key built from the operation kind and its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Search { query: String, page: u32 },
    Details(i64),
    Popular { genre: Option<String>, page: u32 },
    Trending(String),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Search { query, page } => {
                write!(f, "search:{}:{}", query.to_lowercase(), page)
            }
            CacheKey::Details(id) => write!(f, "details:{}", id),
            CacheKey::Popular { genre, page } => {
                write!(f, "popular:{}:{}", genre.as_deref().unwrap_or("all"), page)
            }
            CacheKey::Trending(window) => write!(f, "trending:{}", window),
        }
    }
}

impl CacheKey {
    /// TTL in seconds for entries written under this key.
    pub fn ttl(&self) -> u64 {
        match self {
            CacheKey::Search { .. } => SEARCH_TTL,
            CacheKey::Details(_) => DETAILS_TTL,
            CacheKey::Popular { .. } => POPULAR_TTL,
            CacheKey::Trending(_) => TRENDING_TTL,
        }
    }
}

/// Creates a Redis client for caching
///
/// Establishes a connection to Redis for fast data caching.
/// Uses connection pooling via the connection-manager feature.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Raw string-keyed cache backing store.
///
/// Implementations may fail; the `Cache` wrapper above them turns every
/// failure into a miss or a no-op so the system stays correct with the
/// backing store entirely absent.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<()>;
    async fn delete(&self, key: &str) -> AppResult<()>;
    async fn delete_prefix(&self, prefix: &str) -> AppResult<u64>;
    async fn exists(&self, key: &str) -> AppResult<bool>;
    async fn incr_ex(&self, key: &str, ttl_secs: u64) -> AppResult<i64>;
}

/// Redis-backed implementation of the cache backing store.
#[derive(Clone)]
pub struct RedisBackend {
    client: Client,
}

impl RedisBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn.get(key).await?)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> AppResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let keys: Vec<String> = {
            let mut iter = conn.scan_match(format!("{}*", prefix)).await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        if keys.is_empty() {
            return Ok(0);
        }
        let _: () = conn.del(&keys).await?;
        Ok(keys.len() as u64)
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn.exists(key).await?)
    }

    async fn incr_ex(&self, key: &str, ttl_secs: u64) -> AppResult<i64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let count: i64 = conn.incr(key, 1).await?;
        let _: () = conn.expire(key, ttl_secs as i64).await?;
        Ok(count)
    }
}

/// Degraded-mode-tolerant cache handler.
///
/// Wraps a `CacheBackend` and serializes values as JSON. When the backing
/// store is unreachable, every read transparently misses and every write
/// silently no-ops, so callers never see an error attributable to the cache.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
}

impl Cache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Retrieves and deserializes a cached value; any backend or decode
    /// failure is reported as a miss.
    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let raw = match self.backend.get(&key.to_string()).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache deserialization failed, treating as miss");
                None
            }
        }
    }

    /// Serializes and stores a value under the key's operation TTL.
    pub async fn put_json<T: serde::Serialize>(&self, key: &CacheKey, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Cache serialization error");
                return;
            }
        };

        if let Err(e) = self.backend.set_ex(&key.to_string(), &json, key.ttl()).await {
            tracing::warn!(key = %key, error = %e, "Cache write failed, skipping");
        }
    }

    pub async fn delete(&self, key: &CacheKey) {
        if let Err(e) = self.backend.delete(&key.to_string()).await {
            tracing::warn!(key = %key, error = %e, "Cache delete failed, skipping");
        }
    }

    /// Pattern-based invalidation of all entries under a key prefix.
    pub async fn delete_prefix(&self, prefix: &str) -> u64 {
        match self.backend.delete_prefix(prefix).await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::warn!(prefix = %prefix, error = %e, "Cache prefix delete failed, skipping");
                0
            }
        }
    }

    pub async fn exists(&self, key: &CacheKey) -> bool {
        match self.backend.exists(&key.to_string()).await {
            Ok(exists) => exists,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache exists check failed, treating as miss");
                false
            }
        }
    }

    /// Bumps a daily counter (provider-usage accounting); returns the new
    /// count when the backing store is reachable.
    pub async fn incr_daily(&self, name: &str) -> Option<i64> {
        let key = format!("usage:{}:{}", name, chrono::Utc::now().format("%Y-%m-%d"));
        match self.backend.incr_ex(&key, 172_800).await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!(counter = %name, error = %e, "Usage counter bump failed, skipping");
                None
            }
        }
    }
}
