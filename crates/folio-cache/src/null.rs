use std::time::Duration;

use serde_json::Value;

use crate::error::CacheResult;
use crate::traits::{validate_key, Cache};

/// A cache that stores nothing. Every `get` misses.
///
/// Keys are still validated so callers see the same errors with caching
/// switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl Cache for NullCache {
    fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        validate_key(key)?;
        Ok(None)
    }

    fn set(&self, key: &str, _value: Value, _ttl: Option<Duration>) -> CacheResult<()> {
        validate_key(key)
    }

    fn delete(&self, key: &str) -> CacheResult<bool> {
        validate_key(key)?;
        Ok(false)
    }

    fn clear(&self) -> CacheResult<()> {
        Ok(())
    }
}
