//! Batching data-loader with key coalescing.
//!
//! Keys requested within `wait` of the first key of a batch (or until
//! `max_batch` distinct keys are collected) are fetched with one call.
//! Requesting a key that is already in the open batch reuses its slot.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::{BoxFuture, join_all};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::trace;

use crate::{AppError, AppResult};

/// Output of a batch fetch: one value and one optional error per key.
///
/// A single-element `errors` vector applies to every key of the batch.
#[derive(Debug, Clone)]
pub struct FetchResult<V> {
    /// Values by key position.
    pub values: Vec<V>,
    /// Errors by key position, or one error for the whole batch.
    pub errors: Vec<Option<AppError>>,
}

impl<V> FetchResult<V> {
    /// A successful fetch.
    #[must_use]
    pub const fn ok(values: Vec<V>) -> Self {
        Self {
            values,
            errors: Vec::new(),
        }
    }

    /// A fetch that failed as a whole.
    #[must_use]
    pub fn failed(err: AppError) -> Self {
        Self {
            values: Vec::new(),
            errors: vec![Some(err)],
        }
    }
}

/// Batch fetch function.
pub type FetchFn<K, V> = Arc<dyn Fn(Vec<K>) -> BoxFuture<'static, FetchResult<V>> + Send + Sync>;

/// Data-loader configuration.
#[derive(Debug, Clone, Copy)]
pub struct LoaderConfig {
    /// How long a batch stays open after its first key.
    pub wait: Duration,
    /// Close the batch once this many distinct keys are queued. `0` disables the cap.
    pub max_batch: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            wait: Duration::from_millis(5),
            max_batch: 1000,
        }
    }
}

struct Batch<K, V> {
    keys: Mutex<Vec<K>>,
    closing: AtomicBool,
    done: watch::Sender<Option<Arc<FetchResult<V>>>>,
}

impl<K, V> Batch<K, V> {
    fn new() -> Self {
        let (done, _) = watch::channel(None);
        Self {
            keys: Mutex::new(Vec::new()),
            closing: AtomicBool::new(false),
            done,
        }
    }
}

struct Inner<K, V> {
    fetch: FetchFn<K, V>,
    config: LoaderConfig,
    batch: Mutex<Option<Arc<Batch<K, V>>>>,
}

/// A batching, coalescing loader generic over key and value.
pub struct DataLoader<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for DataLoader<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// A pending result for one key.
pub struct Thunk<V> {
    rx: watch::Receiver<Option<Arc<FetchResult<V>>>>,
    pos: usize,
}

impl<V: Clone + Default> Thunk<V> {
    /// Wait for the batch to complete and read this key's result.
    pub async fn get(mut self) -> AppResult<V> {
        let result = self
            .rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| AppError::internal("data-loader batch aborted"))?
            .clone();

        let Some(result) = result else {
            return Err(AppError::internal("data-loader batch aborted"));
        };

        if result.errors.len() == 1 {
            if let Some(err) = &result.errors[0] {
                return Err(err.clone());
            }
        } else if let Some(Some(err)) = result.errors.get(self.pos) {
            return Err(err.clone());
        }

        Ok(result.values.get(self.pos).cloned().unwrap_or_default())
    }
}

impl<K, V> DataLoader<K, V>
where
    K: PartialEq + Clone + Send + Sync + 'static,
    V: Clone + Default + Send + Sync + 'static,
{
    /// Create a loader around a batch fetch function.
    pub fn new<F>(config: LoaderConfig, fetch: F) -> Self
    where
        F: Fn(Vec<K>) -> BoxFuture<'static, FetchResult<V>> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                fetch: Arc::new(fetch),
                config,
                batch: Mutex::new(None),
            }),
        }
    }

    /// Queue a key and return a thunk for its value.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn load_thunk(&self, key: K) -> Thunk<V> {
        let mut current = self.inner.batch.lock();

        let batch = match current.as_ref() {
            Some(b) => b.clone(),
            None => {
                let b = Arc::new(Batch::new());
                *current = Some(b.clone());
                b
            }
        };

        let (pos, first, full) = {
            let mut keys = batch.keys.lock();
            let pos = match keys.iter().position(|k| *k == key) {
                Some(pos) => pos,
                None => {
                    keys.push(key);
                    keys.len() - 1
                }
            };
            let max = self.inner.config.max_batch;
            (pos, keys.len() == 1 && pos == 0, max > 0 && keys.len() >= max)
        };

        let rx = batch.done.subscribe();

        if full {
            if !batch.closing.swap(true, Ordering::SeqCst) {
                *current = None;
                drop(current);
                trace!("data-loader batch full, fetching");
                tokio::spawn(Self::end(self.inner.fetch.clone(), batch));
            }
        } else if first {
            drop(current);
            tokio::spawn(Self::start_timer(self.inner.clone(), batch));
        }

        Thunk { rx, pos }
    }

    /// Load one key.
    pub async fn load(&self, key: K) -> AppResult<V> {
        self.load_thunk(key).get().await
    }

    /// Load many keys; results are returned in key order.
    pub async fn load_all(&self, keys: Vec<K>) -> Vec<AppResult<V>> {
        let thunks: Vec<Thunk<V>> = keys.into_iter().map(|k| self.load_thunk(k)).collect();
        join_all(thunks.into_iter().map(Thunk::get)).await
    }

    async fn start_timer(inner: Arc<Inner<K, V>>, batch: Arc<Batch<K, V>>) {
        tokio::time::sleep(inner.config.wait).await;

        {
            let mut current = inner.batch.lock();
            if batch.closing.swap(true, Ordering::SeqCst) {
                return;
            }
            if current.as_ref().is_some_and(|b| Arc::ptr_eq(b, &batch)) {
                *current = None;
            }
        }

        trace!("data-loader wait elapsed, fetching");
        Self::end(inner.fetch.clone(), batch).await;
    }

    async fn end(fetch: FetchFn<K, V>, batch: Arc<Batch<K, V>>) {
        let keys = batch.keys.lock().clone();
        let result = fetch(keys).await;
        batch.done.send_replace(Some(Arc::new(result)));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::AtomicUsize;

    fn loader(
        config: LoaderConfig,
        calls: Arc<Mutex<Vec<Vec<String>>>>,
    ) -> DataLoader<String, String> {
        DataLoader::new(config, move |keys: Vec<String>| {
            let calls = calls.clone();
            async move {
                calls.lock().push(keys.clone());
                FetchResult::ok(keys.iter().map(|k| format!("value-{k}")).collect())
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_coalesces_and_caps_batch() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let l = loader(
            LoaderConfig {
                wait: Duration::from_millis(10),
                max_batch: 3,
            },
            calls.clone(),
        );

        let thunks: Vec<_> = ["a", "b", "a", "c"]
            .into_iter()
            .map(|k| l.load_thunk(k.to_string()))
            .collect();

        let mut values = Vec::new();
        for t in thunks {
            values.push(t.get().await.unwrap());
        }

        assert_eq!(values, vec!["value-a", "value-b", "value-a", "value-c"]);
        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_wait_closes_batch() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let l = loader(
            LoaderConfig {
                wait: Duration::from_millis(5),
                max_batch: 0,
            },
            calls.clone(),
        );

        let first = l.load("x".to_string()).await.unwrap();
        let second = l.load("y".to_string()).await.unwrap();

        assert_eq!(first, "value-x");
        assert_eq!(second, "value-y");
        assert_eq!(calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_single_error_is_broadcast() {
        let l: DataLoader<u32, u32> = DataLoader::new(LoaderConfig::default(), |_keys| {
            async { FetchResult::failed(AppError::internal("store down")) }.boxed()
        });

        let results = l.load_all(vec![1, 2, 3]).await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_err()));
    }

    #[tokio::test]
    async fn test_per_index_errors() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let counter = fetches.clone();
        let l: DataLoader<u32, u32> = DataLoader::new(LoaderConfig::default(), move |keys| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                FetchResult {
                    values: keys.iter().map(|k: &u32| k * 10).collect(),
                    errors: keys
                        .iter()
                        .map(|k| (*k == 2).then(|| AppError::UnknownUser(k.to_string())))
                        .collect(),
                }
            }
            .boxed()
        });

        let results = l.load_all(vec![1, 2, 3]).await;
        assert_eq!(results[0], Ok(10));
        assert!(matches!(results[1], Err(AppError::UnknownUser(_))));
        assert_eq!(results[2], Ok(30));
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }
}
