use std::collections::BTreeMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{CacheError, CacheResult};

/// Characters that may not appear in cache keys.
pub const RESERVED_KEY_CHARS: &[char] = &['{', '}', '(', ')', '\\', '@', ':'];

/// Check a cache key: non-empty and free of reserved characters.
pub fn validate_key(key: &str) -> CacheResult<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidArgument {
            key: key.to_string(),
            reason: "key must not be empty".to_string(),
        });
    }
    if let Some(c) = key.chars().find(|c| RESERVED_KEY_CHARS.contains(c)) {
        return Err(CacheError::InvalidArgument {
            key: key.to_string(),
            reason: format!("reserved character {c:?}"),
        });
    }
    Ok(())
}

/// Key-value cache of JSON values.
///
/// Every operation may fail; callers that use the cache as a performance
/// layer treat read failures as misses and write failures as no-ops.
pub trait Cache: Send + Sync {
    /// Fetch a value. Expired and missing entries yield `Ok(None)`.
    fn get(&self, key: &str) -> CacheResult<Option<Value>>;

    /// Store a value. `ttl` overrides the cache's default lifetime.
    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> CacheResult<()>;

    /// Remove a value. Returns `true` if it was present.
    fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Remove every value.
    fn clear(&self) -> CacheResult<()>;

    /// Fetch several values; only hits appear in the result.
    ///
    /// Default implementation calls `get()` for each key.
    fn get_multiple(&self, keys: &[String]) -> CacheResult<BTreeMap<String, Value>> {
        let mut hits = BTreeMap::new();
        for key in keys {
            if let Some(value) = self.get(key)? {
                hits.insert(key.clone(), value);
            }
        }
        Ok(hits)
    }

    /// Store several values.
    ///
    /// Default implementation calls `set()` for each entry.
    fn set_multiple(
        &self,
        values: BTreeMap<String, Value>,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        for (key, value) in values {
            self.set(&key, value, ttl)?;
        }
        Ok(())
    }
}

/// Typed access on top of [`Cache`].
pub trait CacheExt: Cache {
    /// Fetch and decode a value. A value that no longer decodes is a
    /// serialization error.
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        self.get(key)?
            .map(|value| {
                serde_json::from_value(value).map_err(|e| CacheError::Serialization(e.to_string()))
            })
            .transpose()
    }

    /// Encode and store a value.
    fn set_as<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<()> {
        let value =
            serde_json::to_value(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.set(key, value, ttl)
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}
