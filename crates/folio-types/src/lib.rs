//! Core value types for Folio content storage.
//!
//! This crate defines the storage key codec, the natural ordering used by
//! every index, the checksummed node [`Meta`] and the [`Row`] payload that
//! row storages exchange with the coordinator.

pub mod checksum;
pub mod error;
pub mod key;
pub mod meta;
pub mod natural;
pub mod row;

pub use checksum::ContentHasher;
pub use error::{KeyError, KeyResult};
pub use key::{
    split_order, split_params, split_variant, strip_order_prefixes, StorageKey, MODULE_MARKER,
    PARAMS_DELIMITER,
};
pub use meta::{ChildMap, MarkdownMap, Meta, ObjectMeta, Timestamp};
pub use natural::{natural_cmp, NaturalKey};
pub use row::{Row, RowData, RowMeta, KEY_FIELDS};
