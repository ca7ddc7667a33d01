//! Named locks.
//!
//! [`LocalMutexMap`] serializes compound writes inside one process.
//! [`DistributedMutex`] gives TTL-bounded cross-process exclusivity through
//! Redis (`SET NX PX` to acquire, compare-and-delete to release).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fred::clients::Client as RedisClient;
use fred::interfaces::{KeysInterface, LuaInterface};
use fred::types::{Expiration, SetOptions};
use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use crate::cache::KeyScheme;
use crate::{AppError, AppResult};

/// Per-name async mutexes.
#[derive(Default)]
pub struct LocalMutexMap {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LocalMutexMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the mutex for `name`, waiting if another task holds it.
    pub async fn lock(&self, name: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock();
            // Entries only referenced by the map are idle.
            locks.retain(|_, m| Arc::strong_count(m) > 1);
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        mutex.lock_owned().await
    }

    /// Number of names currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Whether no names are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Proof of a held distributed lock.
#[derive(Debug)]
pub struct LockGuard {
    key: String,
    token: String,
}

impl LockGuard {
    /// The Redis key backing this lock.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Redis-backed named lock.
#[derive(Clone)]
pub struct DistributedMutex {
    redis: Arc<RedisClient>,
    keys: KeyScheme,
    retry_interval: Duration,
}

impl DistributedMutex {
    /// Create a distributed mutex over a connected client.
    #[must_use]
    pub const fn new(redis: Arc<RedisClient>, keys: KeyScheme) -> Self {
        Self {
            redis,
            keys,
            retry_interval: Duration::from_millis(50),
        }
    }

    /// Try to take the lock once.
    pub async fn try_acquire(&self, name: &str, ttl: Duration) -> AppResult<Option<LockGuard>> {
        let key = self.keys.key(&["mutex", name]);
        let token = uuid::Uuid::new_v4().simple().to_string();
        let px = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1);

        let reply: Option<String> = self
            .redis
            .set(
                key.clone(),
                token.clone(),
                Some(Expiration::PX(px)),
                Some(SetOptions::NX),
                false,
            )
            .await?;

        if reply.is_some() {
            debug!(key = %key, "Acquired distributed lock");
            Ok(Some(LockGuard { key, token }))
        } else {
            Ok(None)
        }
    }

    /// Take the lock, retrying until `wait` elapses.
    pub async fn acquire(&self, name: &str, ttl: Duration, wait: Duration) -> AppResult<LockGuard> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(guard) = self.try_acquire(name, ttl).await? {
                return Ok(guard);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AppError::internal(format!("timed out acquiring lock {name}")));
            }
            tokio::time::sleep(self.retry_interval).await;
        }
    }

    /// Release a held lock. Releasing a lock that already expired is a no-op.
    pub async fn release(&self, guard: LockGuard) -> AppResult<()> {
        let deleted: i64 = self
            .redis
            .eval(RELEASE_SCRIPT, vec![guard.key.clone()], vec![guard.token])
            .await?;
        if deleted == 0 {
            warn!(key = %guard.key, "Distributed lock expired before release");
        }
        Ok(())
    }

    /// Run `f` while holding the lock.
    pub async fn with_lock<F, Fut, T>(
        &self,
        name: &str,
        ttl: Duration,
        wait: Duration,
        f: F,
    ) -> AppResult<T>
    where
        F: FnOnce() -> Fut + Send,
        Fut: std::future::Future<Output = AppResult<T>> + Send,
    {
        let guard = self.acquire(name, ttl, wait).await?;
        let result = f().await;
        if let Err(e) = self.release(guard).await {
            warn!(name, error = %e, "Failed to release distributed lock");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_local_mutex_serializes_same_name() {
        let map = Arc::new(LocalMutexMap::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let map = map.clone();
            let active = active.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = map.lock("emote-set:1").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            let _ = h.await;
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_local_mutex_prunes_idle_names() {
        let map = LocalMutexMap::new();
        {
            let _a = map.lock("a").await;
        }
        let _b = map.lock("b").await;
        assert_eq!(map.len(), 1);
    }
}
