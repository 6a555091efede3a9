use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lru::LruCache;
use serde_json::Value;
use tracing::warn;

use crate::error::CacheResult;
use crate::traits::{validate_key, Cache};

/// Capacity used by [`MemoryCache::default`].
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Clone, Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

type Store = Arc<Mutex<LruCache<String, Entry>>>;

/// The value under `key`, dropping it if it has expired.
fn live_value(store: &mut LruCache<String, Entry>, key: &str, now: Instant) -> Option<Value> {
    if store.get(key)?.is_expired(now) {
        store.pop(key);
        return None;
    }
    store.peek(key).map(|entry| entry.value.clone())
}

/// Bounded in-process cache with per-entry lifetimes.
///
/// Handles created with [`MemoryCache::namespace`] share one LRU store but
/// see only their own keys; `clear` drops the handle's namespace only.
#[derive(Clone)]
pub struct MemoryCache {
    store: Store,
    namespace: String,
    default_ttl: Option<Duration>,
}

impl MemoryCache {
    /// Create a cache holding at most `capacity` entries across all
    /// namespaces. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store: Arc::new(Mutex::new(LruCache::new(capacity))),
            namespace: String::new(),
            default_ttl: None,
        }
    }

    /// Set the lifetime applied when `set` is called without one.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// A handle on the same store restricted to `namespace`.
    pub fn namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            store: Arc::clone(&self.store),
            namespace: namespace.into(),
            default_ttl: self.default_ttl,
        }
    }

    pub fn namespace_name(&self) -> &str {
        &self.namespace
    }

    /// Number of live entries in this namespace.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let prefix = self.prefix();
        self.lock("len")
            .iter()
            .filter(|(k, e)| k.starts_with(&prefix) && !e.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prefix(&self) -> String {
        format!("{}:", self.namespace)
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{key}", self.namespace)
    }

    fn lock(&self, op: &'static str) -> MutexGuard<'_, LruCache<String, Entry>> {
        match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(op, namespace = %self.namespace, "recovered from poisoned cache lock");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        validate_key(key)?;
        let full_key = self.full_key(key);
        Ok(live_value(&mut self.lock("get"), &full_key, Instant::now()))
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> CacheResult<()> {
        validate_key(key)?;
        let expires_at = ttl.or(self.default_ttl).map(|ttl| Instant::now() + ttl);
        self.lock("set")
            .put(self.full_key(key), Entry { value, expires_at });
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<bool> {
        validate_key(key)?;
        Ok(self.lock("delete").pop(&self.full_key(key)).is_some())
    }

    fn clear(&self) -> CacheResult<()> {
        let prefix = self.prefix();
        let mut store = self.lock("clear");
        let keys: Vec<String> = store
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            store.pop(&key);
        }
        Ok(())
    }

    fn get_multiple(&self, keys: &[String]) -> CacheResult<BTreeMap<String, Value>> {
        for key in keys {
            validate_key(key)?;
        }
        let now = Instant::now();
        let mut store = self.lock("get_multiple");
        let mut hits = BTreeMap::new();
        for key in keys {
            if let Some(value) = live_value(&mut store, &self.full_key(key), now) {
                hits.insert(key.clone(), value);
            }
        }
        Ok(hits)
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("namespace", &self.namespace)
            .field("default_ttl", &self.default_ttl)
            .field("entries", &self.len())
            .finish()
    }
}
