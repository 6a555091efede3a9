//! Cache-aside object loading for Folio.
//!
//! A [`FlexType`] owns one object type: its configuration, a pluggable
//! [`Cache`](folio_cache::Cache) and a lazily created
//! [`RowStorage`](folio_store::RowStorage). Reads consult the cache for the
//! key index (`__keys`) and for rows, fall back to storage on a miss and
//! write what they fetched back. Writes go straight to storage and clear the
//! type's entire cache, since one save can reorder siblings or change the
//! timestamps of ancestors.
//!
//! Loaded rows become [`FlexObject`]s: plain [`GenericObject`]s or
//! [`PageObject`]s, chosen by the configured [`ObjectKind`].

pub mod collection;
pub mod config;
pub mod error;
pub mod flex_type;
pub mod object;

pub use collection::{FlexCollection, KeyIndex};
pub use config::{CacheConfig, FlexConfig, StorageConfig, DEFAULT_CACHE_LIFETIME_SECS};
pub use error::{FlexError, FlexResult};
pub use flex_type::{FlexType, INDEX_CACHE_KEY};
pub use object::{merge_data, FlexObject, GenericObject, ObjectKind, PageObject};
