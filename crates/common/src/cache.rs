//! Cache layers: a namespaced key/value cache (Redis in production) and an
//! in-process TTL map.
//!
//! Redis keys follow `<app>:<version>:<purpose>:<args..>`.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fred::clients::Client as RedisClient;
use fred::interfaces::KeysInterface;
use fred::types::Expiration;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::AppResult;
use crate::config::RedisConfig;

/// Builds namespaced cache keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyScheme {
    app: String,
    version: u32,
}

impl KeyScheme {
    /// Create a key scheme.
    #[must_use]
    pub fn new(app: impl Into<String>, version: u32) -> Self {
        Self {
            app: app.into(),
            version,
        }
    }

    /// Key scheme from Redis configuration.
    #[must_use]
    pub fn from_config(config: &RedisConfig) -> Self {
        Self::new(config.prefix.clone(), config.key_version)
    }

    /// Compose `<app>:<version>:<parts joined by ':'>`.
    #[must_use]
    pub fn key(&self, parts: &[&str]) -> String {
        let mut key = format!("{}:{}", self.app, self.version);
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        key
    }
}

impl Default for KeyScheme {
    fn default() -> Self {
        Self::new("emotes", 1)
    }
}

/// Raw string key/value storage with expiry.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Read a key.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Write a key with a time-to-live.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> AppResult<()>;

    /// Delete a key.
    async fn del(&self, key: &str) -> AppResult<()>;
}

/// Redis-backed key/value cache.
#[derive(Clone)]
pub struct RedisCache {
    redis: Arc<RedisClient>,
}

impl RedisCache {
    /// Wrap a connected Redis client.
    #[must_use]
    pub const fn new(redis: Arc<RedisClient>) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl KeyValueCache for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let value: Option<String> = self.redis.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> AppResult<()> {
        let secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX).max(1);
        self.redis
            .set::<(), _, _>(key, value, Some(Expiration::EX(secs)), None, false)
            .await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> AppResult<()> {
        self.redis.del::<(), _>(key).await?;
        Ok(())
    }
}

/// Process-local key/value cache with the same contract as [`RedisCache`].
///
/// Suitable for single-process deployments and tests.
#[derive(Default)]
pub struct MemoryKeyValueCache {
    entries: RwLock<HashMap<String, (Instant, String)>>,
}

impl MemoryKeyValueCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().values().filter(|(exp, _)| *exp > now).count()
    }

    /// Whether no live keys exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time-to-live of a key.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .read()
            .get(key)
            .and_then(|(exp, _)| exp.checked_duration_since(now))
    }
}

#[async_trait]
impl KeyValueCache for MemoryKeyValueCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .get(key)
            .filter(|(exp, _)| *exp > now)
            .map(|(_, v)| v.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> AppResult<()> {
        self.entries
            .write()
            .insert(key.to_string(), (Instant::now() + ttl, value));
        Ok(())
    }

    async fn del(&self, key: &str) -> AppResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Typed JSON access over a [`KeyValueCache`] with a key scheme.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn KeyValueCache>,
    keys: KeyScheme,
}

impl Cache {
    /// Create a typed cache.
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueCache>, keys: KeyScheme) -> Self {
        Self { backend, keys }
    }

    /// The key scheme in use.
    #[must_use]
    pub const fn keys(&self) -> &KeyScheme {
        &self.keys
    }

    /// Read and decode a JSON value. Decode failures count as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        let Some(raw) = self.backend.get(key).await? else {
            debug!(key, "Cache miss");
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(v) => {
                debug!(key, "Cache hit");
                Ok(Some(v))
            }
            Err(e) => {
                warn!(key, error = %e, "Discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    /// Encode and write a JSON value.
    pub async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> AppResult<()> {
        let raw = serde_json::to_string(value)?;
        self.backend.set(key, raw, ttl).await
    }

    /// Write a JSON value, logging instead of failing.
    pub async fn set_json_best_effort<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Duration) {
        if let Err(e) = self.set_json(key, value, ttl).await {
            warn!(key, error = %e, "Failed to write cache entry");
        }
    }

    /// Delete a key.
    pub async fn invalidate(&self, key: &str) -> AppResult<()> {
        self.backend.del(key).await
    }
}

/// In-process map whose entries expire after a fixed time-to-live.
pub struct LocalCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash + Clone, V: Clone> LocalCache<K, V> {
    /// Create a cache with the given time-to-live.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Read a live entry.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        self.entries
            .read()
            .get(key)
            .filter(|(exp, _)| *exp > now)
            .map(|(_, v)| v.clone())
    }

    /// Insert or replace an entry.
    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write();
        let now = Instant::now();
        entries.retain(|_, (exp, _)| *exp > now);
        entries.insert(key, (now + self.ttl, value));
    }

    /// Drop one entry.
    pub fn invalidate(&self, key: &K) {
        self.entries.write().remove(key);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_key_scheme() {
        let keys = KeyScheme::new("emotes", 3);
        assert_eq!(
            keys.key(&["emote", "abc", "active_sets"]),
            "emotes:3:emote:abc:active_sets"
        );
    }

    #[tokio::test]
    async fn test_json_roundtrip_through_memory_backend() {
        let cache = Cache::new(Arc::new(MemoryKeyValueCache::new()), KeyScheme::default());
        let key = cache.keys().key(&["roles", "default"]);

        assert_eq!(cache.get_json::<Vec<i32>>(&key).await.unwrap(), None);
        cache
            .set_json(&key, &vec![1, 2, 3], Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            cache.get_json::<Vec<i32>>(&key).await.unwrap(),
            Some(vec![1, 2, 3])
        );

        cache.invalidate(&key).await.unwrap();
        assert_eq!(cache.get_json::<Vec<i32>>(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_backend_expires() {
        let kv = MemoryKeyValueCache::new();
        kv.set("k", "v".to_string(), Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(kv.get("k").await.unwrap(), None);
        assert!(kv.is_empty());
    }

    #[test]
    fn test_local_cache_ttl() {
        let cache: LocalCache<&str, i32> = LocalCache::new(Duration::from_secs(30));
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a"), None);

        let short: LocalCache<&str, i32> = LocalCache::new(Duration::ZERO);
        short.insert("b", 2);
        assert_eq!(short.get(&"b"), None);
    }
}
