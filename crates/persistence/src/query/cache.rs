//! Single-flight asynchronous cache.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::error::{StorageResult, internal_error};

/// Caches one lazily computed value.
///
/// Concurrent callers that miss the cache wait on a single load instead of
/// each running the loader. [`invalidate`](Self::invalidate) drops the value;
/// a load already in flight when that happens still returns to its callers
/// but is not kept.
pub struct AsyncCache<T> {
    value: RwLock<Option<Arc<T>>>,
    load_lock: Mutex<()>,
    generation: AtomicU64,
    closed: AtomicBool,
}

impl<T> AsyncCache<T> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            value: RwLock::new(None),
            load_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the cached value, loading it with `loader` on a miss.
    ///
    /// # Errors
    ///
    /// Loader errors are returned as is and nothing is cached. Calling this
    /// after [`close`](Self::close) is an error.
    pub async fn get_or_load<F, Fut>(&self, loader: F) -> StorageResult<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        self.ensure_open()?;
        if let Some(value) = self.value.read().clone() {
            return Ok(value);
        }

        let _guard = self.load_lock.lock().await;
        self.ensure_open()?;
        if let Some(value) = self.value.read().clone() {
            return Ok(value);
        }

        let generation = self.generation.load(Ordering::Acquire);
        let loaded = Arc::new(loader().await?);
        if self.generation.load(Ordering::Acquire) == generation {
            *self.value.write() = Some(Arc::clone(&loaded));
        }
        Ok(loaded)
    }

    /// Returns the cached value without loading.
    pub fn peek(&self) -> Option<Arc<T>> {
        self.value.read().clone()
    }

    /// Drops the cached value so the next call reloads.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        *self.value.write() = None;
    }

    /// Drops the value and refuses further loads.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.invalidate();
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.is_closed() {
            return Err(internal_error("cache", "cache has been closed"));
        }
        Ok(())
    }
}

impl<T> Default for AsyncCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for AsyncCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncCache")
            .field("loaded", &self.value.read().is_some())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_loads_once() {
        let cache = AsyncCache::new();
        let loads = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_load(|| async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await
                .unwrap();
            assert_eq!(*value, 7);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_load() {
        let cache = Arc::new(AsyncCache::new());
        let loads = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let loads = Arc::clone(&loads);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_load(|| async {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok("tags".to_string())
                    })
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().as_str(), "tags");
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let cache = AsyncCache::new();
        cache.get_or_load(|| async { Ok(1) }).await.unwrap();
        cache.invalidate();
        assert!(cache.peek().is_none());
        let value = cache.get_or_load(|| async { Ok(2) }).await.unwrap();
        assert_eq!(*value, 2);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache: AsyncCache<i32> = AsyncCache::new();
        let err = cache
            .get_or_load(|| async { Err(internal_error("test", "boom")) })
            .await;
        assert!(err.is_err());
        assert!(cache.peek().is_none());
    }

    #[tokio::test]
    async fn test_closed_cache_refuses_loads() {
        let cache = AsyncCache::new();
        cache.get_or_load(|| async { Ok(1) }).await.unwrap();
        cache.close();
        assert!(cache.is_closed());
        assert!(cache.get_or_load(|| async { Ok(1) }).await.is_err());
    }
}
