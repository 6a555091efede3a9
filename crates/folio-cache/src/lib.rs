//! Pluggable key-value caching for Folio.
//!
//! The coordinator caches rows and key indexes through the [`Cache`] trait.
//! Values are JSON; [`CacheExt`] adds typed access on top.
//!
//! # Implementations
//!
//! - [`MemoryCache`] -- bounded LRU with per-entry lifetimes and namespaces
//! - [`NullCache`] -- stores nothing, for running with caching disabled
//!
//! Keys must be non-empty and may not contain any of `{}()\@:`.

pub mod error;
pub mod memory;
pub mod null;
pub mod traits;

pub use error::{CacheError, CacheResult};
pub use memory::{MemoryCache, DEFAULT_CAPACITY};
pub use null::NullCache;
pub use traits::{validate_key, Cache, CacheExt, RESERVED_KEY_CHARS};
