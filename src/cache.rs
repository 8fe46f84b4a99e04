//! Memo Cache
//!
//! Bounded, expiring memoization store shared by the repositories of one
//! backend. Values are stored type-erased and handed back as `Arc<T>`, so a
//! cache hit returns the very same allocation as the original load.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Default lifetime of a cache entry
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

type AnyValue = Arc<dyn Any + Send + Sync>;

struct CacheEntry {
    value: AnyValue,
    expires_at: Instant,
    last_used: u64,
}

impl CacheEntry {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Default)]
struct Store {
    entries: HashMap<String, CacheEntry>,
    tick: u64,
}

struct Inner {
    capacity: usize,
    ttl: Duration,
    store: Mutex<Store>,
    key_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Cloneable handle to a shared LRU cache
#[derive(Clone)]
pub struct MemoCache {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock cannot leave the map half-updated
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoCache {
    /// Create a cache holding at most `capacity` entries; 0 disables caching
    pub fn new(capacity: usize) -> Self {
        Self::with_ttl(capacity, DEFAULT_TTL)
    }

    pub fn with_ttl(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity,
                ttl,
                store: Mutex::new(Store::default()),
                key_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.store).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up `key`, returning `None` on miss, expiry or type mismatch
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        if self.inner.capacity == 0 {
            return None;
        }

        let mut store = lock(&self.inner.store);
        store.tick += 1;
        let tick = store.tick;

        let entry = store.entries.get_mut(key)?;
        if !entry.is_valid() {
            store.entries.remove(key);
            return None;
        }
        entry.last_used = tick;
        entry.value.clone().downcast::<T>().ok()
    }

    /// Store `value` under `key`, overwriting any previous entry
    pub fn put<T: Any + Send + Sync>(&self, key: &str, value: Arc<T>) {
        if self.inner.capacity == 0 {
            return;
        }

        let mut store = lock(&self.inner.store);
        store.tick += 1;
        let tick = store.tick;

        if !store.entries.contains_key(key) && store.entries.len() >= self.inner.capacity {
            evict_one(&mut store.entries);
        }

        store.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + self.inner.ttl,
                last_used: tick,
            },
        );
    }

    /// Return the cached value for `key`, or run `load` once and cache it.
    ///
    /// Concurrent callers for the same key wait for the first one and share
    /// its result. Errors are returned to the caller that ran the loader and
    /// are not cached.
    pub async fn get_or_try_load<T, E, F, Fut>(&self, key: &str, load: F) -> Result<Arc<T>, E>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get::<T>(key) {
            tracing::debug!("cache hit: {}", key);
            return Ok(value);
        }

        if self.inner.capacity == 0 {
            return load().await.map(Arc::new);
        }

        let key_lock = {
            let mut locks = lock(&self.inner.key_locks);
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let guard = key_lock.lock().await;

        // Another caller may have filled the entry while we waited
        let result = match self.get::<T>(key) {
            Some(value) => {
                tracing::debug!("cache hit after wait: {}", key);
                Ok(value)
            }
            None => {
                tracing::debug!("cache miss: {}", key);
                load().await.map(|value| {
                    let value = Arc::new(value);
                    self.put(key, value.clone());
                    value
                })
            }
        };

        drop(guard);
        self.release_key_lock(key, key_lock);
        result
    }

    /// Drop the per-key lock once no other caller holds or waits on it
    fn release_key_lock(&self, key: &str, key_lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = lock(&self.inner.key_locks);
        let unused = Arc::strong_count(&key_lock) <= 2
            && locks.get(key).is_some_and(|l| Arc::ptr_eq(l, &key_lock));
        if unused {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    fn key_lock_count(&self) -> usize {
        lock(&self.inner.key_locks).len()
    }
}

fn evict_one(entries: &mut HashMap<String, CacheEntry>) {
    let expired = entries
        .iter()
        .find(|(_, entry)| !entry.is_valid())
        .map(|(key, _)| key.clone());

    let victim = expired.or_else(|| {
        entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone())
    });

    if let Some(key) = victim {
        entries.remove(&key);
    }
}
