use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use folio_types::{Row, RowData, RowMeta, Timestamp};
use tracing::debug;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::{ExistingKeys, KeyEntry, ReadRows, RowResults, RowStorage};

#[derive(Clone, Debug)]
struct StoredRow {
    data: RowData,
    timestamp: Timestamp,
}

/// In-memory, BTreeMap-based row storage.
///
/// Intended for tests and embedding. Keys for new rows are allocated as
/// UUID v7 strings. Timestamps are wall-clock seconds, bumped so that every
/// write of a key is strictly newer than the previous one.
pub struct InMemoryRowStorage {
    rows: RwLock<BTreeMap<String, StoredRow>>,
}

impl InMemoryRowStorage {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of rows currently stored.
    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write_row(map: &mut BTreeMap<String, StoredRow>, key: &str, row: Row) -> Row {
        let previous = map.get(key).map(|r| r.timestamp).unwrap_or(0);
        let timestamp = now().max(previous + 1);
        let data = row.into_persisted();
        map.insert(
            key.to_string(),
            StoredRow {
                data: data.clone(),
                timestamp,
            },
        );
        Row::new(data).with_meta(RowMeta::stored(key))
    }
}

impl Default for InMemoryRowStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as Timestamp)
        .unwrap_or(0)
}

impl RowStorage for InMemoryRowStorage {
    fn get_existing_keys(&self) -> StoreResult<ExistingKeys> {
        let map = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(map
            .iter()
            .map(|(key, row)| (key.clone(), KeyEntry::new(key.clone(), row.timestamp)))
            .collect())
    }

    fn has_key(&self, key: &str) -> StoreResult<bool> {
        let map = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(map.contains_key(key))
    }

    fn create_rows(&self, rows: Vec<(Option<String>, Row)>) -> StoreResult<RowResults> {
        let mut map = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        let mut results = RowResults::new();
        for (key, row) in rows {
            let key = key.unwrap_or_else(|| Uuid::now_v7().simple().to_string());
            if map.contains_key(&key) {
                debug!(key = %key, "row already exists, not created");
                results.insert(key, None);
                continue;
            }
            let saved = Self::write_row(&mut map, &key, row);
            results.insert(key, Some(saved));
        }
        Ok(results)
    }

    fn read_rows(&self, rows: BTreeMap<String, Option<Row>>) -> StoreResult<ReadRows> {
        let map = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        let mut result = ReadRows::default();
        for (key, row) in rows {
            if let Some(row) = row {
                result.rows.insert(key, Some(row));
                continue;
            }
            match map.get(&key) {
                Some(stored) => {
                    let row = Row::new(stored.data.clone()).with_meta(RowMeta::stored(&key));
                    result.fetched.insert(key.clone(), row.clone());
                    result.rows.insert(key, Some(row));
                }
                None => {
                    result.rows.insert(key, None);
                }
            }
        }
        Ok(result)
    }

    fn update_rows(&self, rows: BTreeMap<String, Row>) -> StoreResult<RowResults> {
        let mut map = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        let mut results = RowResults::new();
        for (key, row) in rows {
            if !map.contains_key(&key) {
                results.insert(key, None);
                continue;
            }
            let saved = Self::write_row(&mut map, &key, row);
            results.insert(key, Some(saved));
        }
        Ok(results)
    }

    fn delete_rows(&self, rows: BTreeMap<String, Row>) -> StoreResult<RowResults> {
        let mut map = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        let mut results = RowResults::new();
        for key in rows.into_keys() {
            let removed = map
                .remove(&key)
                .map(|stored| Row::new(stored.data).with_meta(RowMeta::stored(&key)));
            results.insert(key, removed);
        }
        Ok(results)
    }

    fn replace_rows(&self, rows: BTreeMap<String, Row>) -> StoreResult<RowResults> {
        let mut map = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        let mut results = RowResults::new();
        for (key, row) in rows {
            let saved = Self::write_row(&mut map, &key, row);
            results.insert(key, Some(saved));
        }
        Ok(results)
    }

    fn get_path_from_key(&self, key: &str) -> StoreResult<PathBuf> {
        Err(StoreError::Unsupported(format!(
            "in-memory storage has no path for {key:?}"
        )))
    }
}

impl std::fmt::Debug for InMemoryRowStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRowStorage")
            .field("row_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        Row::from_value(value).unwrap()
    }

    fn single(key: &str, row: Row) -> BTreeMap<String, Row> {
        BTreeMap::from([(key.to_string(), row)])
    }

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    #[test]
    fn create_allocates_uuid_keys() {
        let store = InMemoryRowStorage::new();
        let results = store
            .create_rows(vec![(None, row(json!({"title": "a"}))), (None, row(json!({"title": "b"})))])
            .unwrap();
        assert_eq!(results.len(), 2);
        for key in results.keys() {
            assert_eq!(key.len(), 32);
            assert!(Uuid::parse_str(key).is_ok());
        }
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn create_existing_key_yields_none() {
        let store = InMemoryRowStorage::new();
        store
            .create_rows(vec![(Some("post".into()), row(json!({"v": 1})))])
            .unwrap();
        let results = store
            .create_rows(vec![(Some("post".into()), row(json!({"v": 2})))])
            .unwrap();
        assert_eq!(results.get("post"), Some(&None));
        let stored = store.read_row("post").unwrap().unwrap();
        assert_eq!(stored.get("v"), Some(&json!(1)));
    }

    #[test]
    fn create_strips_side_channel_and_key_fields() {
        let store = InMemoryRowStorage::new();
        let mut input = row(json!({"folder": "x", "title": "t"}));
        input.error = Some("bad".into());
        store.create_rows(vec![(Some("k".into()), input)]).unwrap();
        let stored = store.read_row("k").unwrap().unwrap();
        assert_eq!(stored.data.len(), 1);
        assert!(stored.error.is_none());
        assert_eq!(stored.storage_key(), Some("k"));
    }

    // -----------------------------------------------------------------------
    // Read
    // -----------------------------------------------------------------------

    #[test]
    fn read_passes_hydrated_rows_through() {
        let store = InMemoryRowStorage::new();
        store
            .create_rows(vec![(Some("a".into()), row(json!({"v": "disk"})))])
            .unwrap();

        let mut request = BTreeMap::new();
        request.insert("a".to_string(), Some(row(json!({"v": "cached"}))));
        let result = store.read_rows(request).unwrap();

        assert!(result.fetched.is_empty());
        let a = result.rows["a"].as_ref().unwrap();
        assert_eq!(a.get("v"), Some(&json!("cached")));
    }

    #[test]
    fn read_fetches_missing_and_reports_absent() {
        let store = InMemoryRowStorage::new();
        store
            .create_rows(vec![(Some("a".into()), row(json!({"v": 1})))])
            .unwrap();

        let request = BTreeMap::from([("a".to_string(), None), ("gone".to_string(), None)]);
        let result = store.read_rows(request).unwrap();

        assert_eq!(result.fetched.len(), 1);
        assert!(result.fetched.contains_key("a"));
        assert_eq!(result.rows.get("gone"), Some(&None));
    }

    // -----------------------------------------------------------------------
    // Update / delete / replace
    // -----------------------------------------------------------------------

    #[test]
    fn update_missing_yields_none() {
        let store = InMemoryRowStorage::new();
        let results = store.update_rows(single("nope", row(json!({})))).unwrap();
        assert_eq!(results.get("nope"), Some(&None));
        assert!(store.is_empty());
    }

    #[test]
    fn update_bumps_timestamp() {
        let store = InMemoryRowStorage::new();
        store
            .create_rows(vec![(Some("a".into()), row(json!({"v": 1})))])
            .unwrap();
        let before = store.get_existing_keys().unwrap()["a"].timestamp;
        store.update_rows(single("a", row(json!({"v": 2})))).unwrap();
        let after = store.get_existing_keys().unwrap()["a"].timestamp;
        assert!(after > before);
    }

    #[test]
    fn delete_returns_removed_row() {
        let store = InMemoryRowStorage::new();
        store
            .create_rows(vec![(Some("a".into()), row(json!({"v": 1})))])
            .unwrap();
        let results = store.delete_rows(single("a", Row::default())).unwrap();
        assert!(results["a"].is_some());
        assert!(!store.has_key("a").unwrap());

        let results = store.delete_rows(single("a", Row::default())).unwrap();
        assert!(results["a"].is_none());
    }

    #[test]
    fn replace_creates_or_overwrites() {
        let store = InMemoryRowStorage::new();
        store.replace_rows(single("a", row(json!({"v": 1})))).unwrap();
        store.replace_rows(single("a", row(json!({"v": 2})))).unwrap();
        assert_eq!(store.len(), 1);
        let stored = store.read_row("a").unwrap().unwrap();
        assert_eq!(stored.get("v"), Some(&json!(2)));
    }

    #[test]
    fn existing_keys_map_to_themselves() {
        let store = InMemoryRowStorage::new();
        store.replace_rows(single("a", row(json!({})))).unwrap();
        let keys = store.get_existing_keys().unwrap();
        assert_eq!(keys["a"].storage_key, "a");
    }

    #[test]
    fn path_lookup_is_unsupported() {
        let store = InMemoryRowStorage::new();
        assert!(matches!(
            store.get_path_from_key("a"),
            Err(StoreError::Unsupported(_))
        ));
    }
}
