use std::collections::BTreeMap;
use std::path::PathBuf;

use folio_types::{Row, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Where one logical object lives and when it last changed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    /// Key understood by the storage's row operations.
    pub storage_key: String,
    /// Last modification, in seconds since the Unix epoch.
    pub timestamp: Timestamp,
}

impl KeyEntry {
    pub fn new(storage_key: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            storage_key: storage_key.into(),
            timestamp,
        }
    }
}

/// Every stored object, keyed by logical key.
pub type ExistingKeys = BTreeMap<String, KeyEntry>;

/// Per-key outcome of a batch operation. `None` marks an entry that was
/// skipped or failed while the rest of the batch proceeded.
pub type RowResults = BTreeMap<String, Option<Row>>;

/// Outcome of [`RowStorage::read_rows`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReadRows {
    /// Every requested key: hydrated inputs unchanged, others read from the
    /// backend or `None` when missing.
    pub rows: RowResults,
    /// Only the rows that were actually read from the backend.
    pub fetched: BTreeMap<String, Row>,
}

/// Row storage backend.
///
/// All implementations must satisfy these invariants:
/// - Batch operations degrade per entry: a key or I/O problem with one row
///   yields `None` for that row and the batch continues.
/// - Rows are owned by the caller and never retained between calls.
/// - Side-channel data (`Row::meta`, `Row::error`) is never persisted.
/// - A storage has a single writer per key; no locking is performed.
pub trait RowStorage: Send + Sync {
    /// List every stored object with its storage key and timestamp.
    fn get_existing_keys(&self) -> StoreResult<ExistingKeys>;

    /// Check whether a row exists under `key`.
    fn has_key(&self, key: &str) -> StoreResult<bool>;

    /// Create rows. Entries without a key get one allocated (or derived from
    /// the row). Entries whose key already exists yield `None`.
    fn create_rows(&self, rows: Vec<(Option<String>, Row)>) -> StoreResult<RowResults>;

    /// Read rows. Hydrated entries pass through unchanged and are never
    /// fetched; `None` entries are read from the backend.
    fn read_rows(&self, rows: BTreeMap<String, Option<Row>>) -> StoreResult<ReadRows>;

    /// Update existing rows. Missing keys yield `None`.
    fn update_rows(&self, rows: BTreeMap<String, Row>) -> StoreResult<RowResults>;

    /// Delete rows, returning the removed rows. Missing keys yield `None`.
    fn delete_rows(&self, rows: BTreeMap<String, Row>) -> StoreResult<RowResults>;

    /// Create or overwrite rows regardless of existence.
    fn replace_rows(&self, rows: BTreeMap<String, Row>) -> StoreResult<RowResults>;

    /// Resolve the backend location of `key`.
    fn get_path_from_key(&self, key: &str) -> StoreResult<PathBuf>;

    /// The logical key [`RowStorage::get_existing_keys`] lists the row
    /// stored under `storage_key` by.
    fn logical_key(&self, storage_key: &str) -> StoreResult<String> {
        Ok(storage_key.to_string())
    }

    /// Drop any cached view of the backend so the next call rescans it.
    fn invalidate_index(&self) {}

    /// Read a single row.
    ///
    /// Default implementation calls `read_rows()` with one entry.
    fn read_row(&self, key: &str) -> StoreResult<Option<Row>> {
        let mut request = BTreeMap::new();
        request.insert(key.to_string(), None);
        let mut result = self.read_rows(request)?;
        Ok(result.rows.remove(key).flatten())
    }
}
