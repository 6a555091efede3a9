use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use folio_cache::{Cache, CacheExt};
use folio_pages::PageStorage;
use folio_store::{ExistingKeys, InMemoryRowStorage, KeyEntry, PathResolver, ReadRows, RowStorage};
use folio_types::{Row, RowData, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::collection::{FlexCollection, KeyIndex};
use crate::config::{FlexConfig, StorageConfig};
use crate::error::{FlexError, FlexResult};
use crate::object::FlexObject;

/// Cache key holding the type's existing keys.
pub const INDEX_CACHE_KEY: &str = "__keys";

/// A row as kept in the cache, stamped with the index timestamp it was
/// loaded for.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct CachedRow {
    timestamp: Timestamp,
    row: Row,
}

impl CachedRow {
    fn is_fresh(&self, timestamp: Timestamp) -> bool {
        if self.timestamp < timestamp {
            return false;
        }
        match &self.row.meta.object {
            Some(object) => object.node.verify_checksum(),
            None => true,
        }
    }
}

/// Cache-aside loader for one object type.
///
/// Rows and the key index are served from the cache when possible and read
/// from the row storage otherwise. Every write clears the type's whole
/// cache. Cache failures are logged and treated as misses.
pub struct FlexType {
    config: FlexConfig,
    cache: Arc<dyn Cache>,
    resolver: Arc<dyn PathResolver>,
    storage: OnceLock<Arc<dyn RowStorage>>,
    index: RwLock<Option<KeyIndex>>,
}

impl FlexType {
    pub fn new(config: FlexConfig, cache: Arc<dyn Cache>, resolver: Arc<dyn PathResolver>) -> Self {
        Self {
            config,
            cache,
            resolver,
            storage: OnceLock::new(),
            index: RwLock::new(None),
        }
    }

    /// Build the type with the cache its config describes.
    pub fn from_config(config: FlexConfig, resolver: Arc<dyn PathResolver>) -> Self {
        let cache = config.cache.build(&config.cache_namespace());
        Self::new(config, cache, resolver)
    }

    /// Use `storage` instead of the one the config describes.
    pub fn with_storage(mut self, storage: Arc<dyn RowStorage>) -> Self {
        self.storage = OnceLock::from(storage);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.config.type_name
    }

    pub fn config(&self) -> &FlexConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    /// The row storage, created on first use.
    pub fn storage(&self) -> &dyn RowStorage {
        self.storage.get_or_init(|| self.create_storage()).as_ref()
    }

    fn create_storage(&self) -> Arc<dyn RowStorage> {
        debug!(type_name = %self.config.type_name, "creating row storage");
        match &self.config.storage {
            StorageConfig::Memory => Arc::new(InMemoryRowStorage::new()),
            StorageConfig::Pages(options) => {
                Arc::new(PageStorage::new(options.clone(), self.resolver.as_ref()))
            }
        }
    }

    /// Backend location of the object stored under `storage_key`.
    pub fn storage_path(&self, storage_key: &str) -> FlexResult<PathBuf> {
        Ok(self.storage().get_path_from_key(storage_key)?)
    }

    /// The ordered key index, from memory, the cache or a storage scan.
    pub fn get_index(&self) -> FlexResult<KeyIndex> {
        if let Some(index) = self.index.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(index.clone());
        }

        let cached = match self.cache.get_as::<ExistingKeys>(INDEX_CACHE_KEY) {
            Ok(keys) => keys,
            Err(e) => {
                warn!(type_name = %self.config.type_name, error = %e, "key index cache read failed");
                None
            }
        };

        let keys = match cached {
            Some(keys) => keys,
            None => {
                let keys = self.storage().get_existing_keys()?;
                debug!(type_name = %self.config.type_name, count = keys.len(), "scanned storage keys");
                if let Err(e) = self.cache.set_as(INDEX_CACHE_KEY, &keys, None) {
                    warn!(type_name = %self.config.type_name, error = %e, "key index cache write failed");
                }
                keys
            }
        };

        let index = KeyIndex::new(keys, self.config.kind, self.config.manual_order());
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = Some(index.clone());
        Ok(index)
    }

    /// Load objects for `(key, entry)` pairs, in the order given.
    ///
    /// Entries whose row is missing from storage are left out.
    pub fn load_objects(&self, entries: &[(String, KeyEntry)]) -> FlexResult<Vec<FlexObject>> {
        let timestamps: BTreeMap<&str, Timestamp> = entries
            .iter()
            .map(|(_, entry)| (entry.storage_key.as_str(), entry.timestamp))
            .collect();
        let storage_keys: Vec<String> = timestamps.keys().map(|key| key.to_string()).collect();

        let cached = match self.cache.get_multiple(&storage_keys) {
            Ok(hits) => hits,
            Err(e) => {
                warn!(type_name = %self.config.type_name, error = %e, "row cache read failed");
                BTreeMap::new()
            }
        };

        let mut request: BTreeMap<String, Option<Row>> =
            storage_keys.iter().map(|key| (key.clone(), None)).collect();
        let mut hits = 0usize;
        for (storage_key, value) in cached {
            let Some(&timestamp) = timestamps.get(storage_key.as_str()) else {
                continue;
            };
            match serde_json::from_value::<CachedRow>(value) {
                Ok(cached) if cached.is_fresh(timestamp) => {
                    hits += 1;
                    request.insert(storage_key, Some(cached.row));
                }
                Ok(_) => trace!(storage_key = %storage_key, "cached row is stale"),
                Err(e) => warn!(storage_key = %storage_key, error = %e, "undecodable cached row"),
            }
        }

        let ReadRows { rows, fetched } = self.storage().read_rows(request)?;
        debug!(
            type_name = %self.config.type_name,
            requested = storage_keys.len(),
            cached = hits,
            fetched = fetched.len(),
            "loaded rows"
        );

        if !fetched.is_empty() {
            let values: BTreeMap<String, Value> = fetched
                .into_iter()
                .filter_map(|(storage_key, row)| {
                    let timestamp = *timestamps.get(storage_key.as_str())?;
                    match serde_json::to_value(CachedRow { timestamp, row }) {
                        Ok(value) => Some((storage_key, value)),
                        Err(e) => {
                            warn!(storage_key = %storage_key, error = %e, "row not cacheable");
                            None
                        }
                    }
                })
                .collect();
            if let Err(e) = self.cache.set_multiple(values, None) {
                warn!(type_name = %self.config.type_name, error = %e, "row cache write failed");
            }
        }

        let objects = entries
            .iter()
            .filter_map(|(key, entry)| {
                let row = rows.get(&entry.storage_key).cloned().flatten()?;
                let mut object = self.config.kind.create(key.clone(), row);
                object.set_storage_key(entry.storage_key.clone());
                object.set_timestamp(entry.timestamp);
                Some(object)
            })
            .collect();
        Ok(objects)
    }

    /// Every object of the type, in index order.
    pub fn get_collection(&self) -> FlexResult<FlexCollection> {
        let index = self.get_index()?;
        Ok(FlexCollection::new(self.load_objects(&index.to_entries())?))
    }

    /// The objects for `keys` that exist, in the order given.
    pub fn load_collection<I, S>(&self, keys: I) -> FlexResult<FlexCollection>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let index = self.get_index()?;
        Ok(FlexCollection::new(self.load_objects(&index.select(keys))?))
    }

    pub fn get_object(&self, key: &str) -> FlexResult<Option<FlexObject>> {
        Ok(self.load_collection([key])?.into_iter().next())
    }

    /// Create or update an object.
    ///
    /// Without a key, or with a key the index does not know, a new object is
    /// created from `data`. Otherwise `data` is merged into the stored
    /// object. The type's cache is cleared afterwards, also when the storage
    /// call fails part way.
    pub fn update(&self, data: RowData, key: Option<&str>) -> FlexResult<FlexObject> {
        let existing = match key {
            Some(key) => self.get_object(key)?,
            None => None,
        };
        let result = match existing {
            Some(object) => self.save_existing(object, data),
            None => self.create(data),
        };
        self.invalidate();
        result
    }

    fn create(&self, data: RowData) -> FlexResult<FlexObject> {
        let object = self.config.kind.create(String::new(), Row::new(data));
        let results = self
            .storage()
            .create_rows(vec![(None, object.prepare_storage())])?;
        let (storage_key, row) = results
            .into_iter()
            .find_map(|(key, row)| row.map(|row| (key, row)))
            .ok_or_else(|| FlexError::Rejected {
                operation: "create",
                key: String::new(),
            })?;

        let key = self.storage().logical_key(&storage_key)?;
        debug!(type_name = %self.config.type_name, key = %key, storage_key = %storage_key, "created object");
        let mut object = self.config.kind.create(key, row);
        object.set_storage_key(storage_key);
        Ok(object)
    }

    fn save_existing(&self, mut object: FlexObject, data: RowData) -> FlexResult<FlexObject> {
        let storage_key = object
            .storage_key()
            .map(str::to_string)
            .ok_or_else(|| FlexError::Rejected {
                operation: "update",
                key: object.key().to_string(),
            })?;

        object.update(data);
        let request = BTreeMap::from([(storage_key.clone(), object.prepare_storage())]);
        let row = self
            .storage()
            .update_rows(request)?
            .remove(&storage_key)
            .flatten()
            .ok_or_else(|| FlexError::Rejected {
                operation: "update",
                key: object.key().to_string(),
            })?;

        object.apply_saved(row);
        if let Some(saved_key) = object.storage_key().filter(|key| *key != storage_key) {
            let key = self.storage().logical_key(saved_key)?;
            object.set_key(key);
        }
        debug!(
            type_name = %self.config.type_name,
            key = %object.key(),
            from = %storage_key,
            to = object.storage_key().unwrap_or_default(),
            "updated object"
        );
        Ok(object)
    }

    /// Delete the object stored under `key`. Returns `None` when the index
    /// does not know the key.
    pub fn remove(&self, key: &str) -> FlexResult<Option<FlexObject>> {
        let Some(object) = self.get_object(key)? else {
            return Ok(None);
        };
        let Some(storage_key) = object.storage_key().map(str::to_string) else {
            return Ok(None);
        };

        let request = BTreeMap::from([(storage_key.clone(), object.prepare_storage())]);
        let result = self.storage().delete_rows(request);
        self.invalidate();

        if result?.remove(&storage_key).flatten().is_none() {
            warn!(type_name = %self.config.type_name, storage_key = %storage_key, "row vanished before delete");
        } else {
            debug!(type_name = %self.config.type_name, storage_key = %storage_key, "removed object");
        }
        Ok(Some(object))
    }

    /// Drop every cached row, the key index and the storage's own index.
    pub fn invalidate(&self) {
        if let Err(e) = self.cache.clear() {
            warn!(type_name = %self.config.type_name, error = %e, "cache clear failed");
        }
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = None;
        if let Some(storage) = self.storage.get() {
            storage.invalidate_index();
        }
    }
}

impl std::fmt::Debug for FlexType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlexType")
            .field("type_name", &self.config.type_name)
            .field("kind", &self.config.kind)
            .field("storage_ready", &self.storage.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectKind;
    use folio_cache::{CacheError, CacheResult, MemoryCache, NullCache};
    use folio_store::{RootResolver, RowResults, StorageOptions, StoreResult};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn data(value: Value) -> RowData {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    /// Storage wrapper counting scans and backend reads.
    #[derive(Default)]
    struct CountingStorage {
        inner: InMemoryRowStorage,
        scans: AtomicUsize,
        fetched: AtomicUsize,
    }

    impl CountingStorage {
        fn scans(&self) -> usize {
            self.scans.load(Ordering::SeqCst)
        }

        fn fetched(&self) -> usize {
            self.fetched.load(Ordering::SeqCst)
        }
    }

    impl RowStorage for CountingStorage {
        fn get_existing_keys(&self) -> StoreResult<ExistingKeys> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            self.inner.get_existing_keys()
        }

        fn has_key(&self, key: &str) -> StoreResult<bool> {
            self.inner.has_key(key)
        }

        fn create_rows(&self, rows: Vec<(Option<String>, Row)>) -> StoreResult<RowResults> {
            self.inner.create_rows(rows)
        }

        fn read_rows(&self, rows: BTreeMap<String, Option<Row>>) -> StoreResult<ReadRows> {
            let result = self.inner.read_rows(rows)?;
            self.fetched.fetch_add(result.fetched.len(), Ordering::SeqCst);
            Ok(result)
        }

        fn update_rows(&self, rows: BTreeMap<String, Row>) -> StoreResult<RowResults> {
            self.inner.update_rows(rows)
        }

        fn delete_rows(&self, rows: BTreeMap<String, Row>) -> StoreResult<RowResults> {
            self.inner.delete_rows(rows)
        }

        fn replace_rows(&self, rows: BTreeMap<String, Row>) -> StoreResult<RowResults> {
            self.inner.replace_rows(rows)
        }

        fn get_path_from_key(&self, key: &str) -> StoreResult<PathBuf> {
            self.inner.get_path_from_key(key)
        }
    }

    /// Cache whose every call fails.
    struct BrokenCache;

    impl Cache for BrokenCache {
        fn get(&self, _key: &str) -> CacheResult<Option<Value>> {
            Err(CacheError::Unavailable("down".to_string()))
        }

        fn set(&self, _key: &str, _value: Value, _ttl: Option<Duration>) -> CacheResult<()> {
            Err(CacheError::Unavailable("down".to_string()))
        }

        fn delete(&self, _key: &str) -> CacheResult<bool> {
            Err(CacheError::Unavailable("down".to_string()))
        }

        fn clear(&self) -> CacheResult<()> {
            Err(CacheError::Unavailable("down".to_string()))
        }
    }

    fn resolver() -> Arc<dyn PathResolver> {
        Arc::new(RootResolver::new("."))
    }

    fn flex_with(cache: Arc<dyn Cache>) -> (FlexType, Arc<CountingStorage>) {
        let storage = Arc::new(CountingStorage::default());
        let flex = FlexType::new(FlexConfig::new("notes"), cache, resolver())
            .with_storage(storage.clone());
        (flex, storage)
    }

    fn flex() -> (FlexType, Arc<CountingStorage>) {
        flex_with(Arc::new(MemoryCache::default()))
    }

    fn seed(storage: &CountingStorage, key: &str, value: Value) {
        storage
            .inner
            .create_rows(vec![(Some(key.to_string()), Row::new(data(value)))])
            .unwrap();
    }

    // -----------------------------------------------------------------------
    // Index
    // -----------------------------------------------------------------------

    #[test]
    fn index_is_scanned_once() {
        let (flex, storage) = flex();
        seed(&storage, "a", json!({"title": "A"}));

        assert_eq!(flex.get_index().unwrap().len(), 1);
        assert_eq!(flex.get_index().unwrap().len(), 1);
        assert_eq!(storage.scans(), 1);
    }

    #[test]
    fn index_comes_from_shared_cache() {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::default());
        let storage = Arc::new(CountingStorage::default());
        seed(&storage, "a", json!({}));

        let first = FlexType::new(FlexConfig::new("notes"), cache.clone(), resolver())
            .with_storage(storage.clone());
        first.get_index().unwrap();

        let second = FlexType::new(FlexConfig::new("notes"), cache, resolver())
            .with_storage(storage.clone());
        assert!(second.get_index().unwrap().contains("a"));
        assert_eq!(storage.scans(), 1);
    }

    #[test]
    fn update_forces_rescan() {
        let (flex, storage) = flex();
        seed(&storage, "a", json!({"title": "A"}));
        flex.get_index().unwrap();

        flex.update(data(json!({"title": "B"})), Some("a")).unwrap();
        assert_eq!(storage.scans(), 1);

        flex.get_index().unwrap();
        assert_eq!(storage.scans(), 2);
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    #[test]
    fn rows_are_served_from_cache() {
        let (flex, storage) = flex();
        seed(&storage, "a", json!({"title": "A"}));
        seed(&storage, "b", json!({"title": "B"}));

        let first = flex.get_collection().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(storage.fetched(), 2);

        let second = flex.get_collection().unwrap();
        assert_eq!(second.get("b").unwrap().get("title"), Some(&json!("B")));
        assert_eq!(storage.fetched(), 2);
    }

    #[test]
    fn objects_are_stamped() {
        let (flex, storage) = flex();
        seed(&storage, "a", json!({}));
        let entry = flex.get_index().unwrap().get("a").cloned().unwrap();

        let object = flex.get_object("a").unwrap().unwrap();
        assert_eq!(object.storage_key(), Some("a"));
        assert_eq!(object.timestamp(), entry.timestamp);
    }

    #[test]
    fn stale_cached_rows_are_refetched() {
        let (flex, storage) = flex();
        seed(&storage, "a", json!({"title": "fresh"}));
        let stale = CachedRow {
            timestamp: 0,
            row: Row::new(data(json!({"title": "stale"}))),
        };
        flex.cache()
            .set("a", serde_json::to_value(stale).unwrap(), None)
            .unwrap();

        let object = flex.get_object("a").unwrap().unwrap();
        assert_eq!(object.get("title"), Some(&json!("fresh")));
        assert_eq!(storage.fetched(), 1);
    }

    #[test]
    fn unknown_and_missing_keys_are_skipped() {
        let (flex, storage) = flex();
        seed(&storage, "a", json!({}));
        let entries = vec![
            ("a".to_string(), KeyEntry::new("a", 0)),
            ("gone".to_string(), KeyEntry::new("gone", 0)),
        ];
        let objects = flex.load_objects(&entries).unwrap();
        assert_eq!(objects.len(), 1);
        assert!(flex.get_object("nope").unwrap().is_none());
    }

    #[test]
    fn cache_failures_are_misses() {
        let (flex, storage) = flex_with(Arc::new(BrokenCache));
        seed(&storage, "a", json!({"title": "A"}));

        assert_eq!(flex.get_collection().unwrap().len(), 1);
        let object = flex.update(data(json!({"title": "B"})), Some("a")).unwrap();
        assert_eq!(object.get("title"), Some(&json!("B")));
        assert!(flex.remove("a").unwrap().is_some());
    }

    #[test]
    fn invalid_cache_keys_fall_back_to_storage() {
        let (flex, storage) = flex();
        seed(&storage, "user@example", json!({"title": "A"}));

        let object = flex.get_object("user@example").unwrap().unwrap();
        assert_eq!(object.get("title"), Some(&json!("A")));
    }

    #[test]
    fn null_cache_always_reads_storage() {
        let (flex, storage) = flex_with(Arc::new(NullCache));
        seed(&storage, "a", json!({}));
        flex.get_collection().unwrap();
        flex.get_collection().unwrap();
        assert_eq!(storage.scans(), 2);
        assert_eq!(storage.fetched(), 2);
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    #[test]
    fn update_without_key_creates() {
        let (flex, storage) = flex();
        let object = flex.update(data(json!({"title": "New"})), None).unwrap();

        let key = object.storage_key().unwrap().to_string();
        assert_eq!(object.key(), key);
        assert!(storage.has_key(&key).unwrap());
        assert!(flex.get_index().unwrap().contains(&key));
    }

    #[test]
    fn update_with_unknown_key_creates() {
        let (flex, storage) = flex();
        flex.update(data(json!({"title": "New"})), Some("missing")).unwrap();
        assert_eq!(storage.inner.len(), 1);
        assert!(!storage.has_key("missing").unwrap());
    }

    #[test]
    fn update_merges_into_stored_object() {
        let (flex, storage) = flex();
        seed(&storage, "a", json!({"title": "A", "header": {"menu": "A", "visible": true}}));

        flex.update(data(json!({"header": {"menu": "B"}})), Some("a")).unwrap();

        let object = flex.get_object("a").unwrap().unwrap();
        assert_eq!(
            Value::Object(object.data().clone()),
            json!({"title": "A", "header": {"menu": "B", "visible": true}})
        );
    }

    #[test]
    fn update_clears_cached_rows() {
        let (flex, storage) = flex();
        seed(&storage, "a", json!({"title": "A"}));
        seed(&storage, "b", json!({"title": "B"}));
        flex.get_collection().unwrap();

        flex.update(data(json!({"title": "A2"})), Some("a")).unwrap();
        let fetched = storage.fetched();
        flex.get_collection().unwrap();
        assert_eq!(storage.fetched(), fetched + 2);
    }

    #[test]
    fn remove_deletes_and_clears() {
        let (flex, storage) = flex();
        seed(&storage, "a", json!({}));

        let removed = flex.remove("a").unwrap().unwrap();
        assert_eq!(removed.key(), "a");
        assert!(storage.inner.is_empty());
        assert!(flex.get_index().unwrap().is_empty());
        assert!(flex.remove("a").unwrap().is_none());
    }

    // -----------------------------------------------------------------------
    // Pages
    // -----------------------------------------------------------------------

    fn pages(root: &std::path::Path) -> FlexType {
        let config = FlexConfig {
            type_name: "pages".to_string(),
            kind: ObjectKind::Page,
            storage: StorageConfig::Pages(StorageOptions::new("pages")),
            ..FlexConfig::default()
        };
        FlexType::from_config(config, Arc::new(RootResolver::new(root)))
    }

    #[test]
    fn pages_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let flex = pages(dir.path());

        let created = flex
            .update(
                data(json!({"folder": "about", "order": 3, "title": "About", "markdown": "Hello"})),
                None,
            )
            .unwrap();
        assert_eq!(created.storage_key(), Some("03.about|default"));
        assert!(dir.path().join("pages/03.about/default.md").is_file());

        let collection = flex.get_collection().unwrap();
        let page = collection.get("about|default").unwrap().as_page().unwrap();
        assert_eq!(page.order(), 3);
        assert_eq!(page.template(), Some("default"));
        assert_eq!(page.content(), Some("Hello"));
        assert_eq!(
            flex.storage_path("03.about|default").unwrap(),
            dir.path().join("pages/03.about/default.md")
        );
    }

    #[test]
    fn created_page_is_found_by_its_key() {
        let dir = tempfile::tempdir().unwrap();
        let flex = pages(dir.path());

        let created = flex
            .update(data(json!({"folder": "about", "order": 3, "title": "About"})), None)
            .unwrap();
        assert_eq!(created.key(), "about|default");
        assert_eq!(created.storage_key(), Some("03.about|default"));

        let found = flex.get_object(created.key()).unwrap().unwrap();
        assert_eq!(found.storage_key(), Some("03.about|default"));
    }

    #[test]
    fn page_folder_rename_through_update() {
        let dir = tempfile::tempdir().unwrap();
        let flex = pages(dir.path());
        flex.update(data(json!({"folder": "about", "title": "About"})), None)
            .unwrap();

        let moved = flex
            .update(data(json!({"folder": "company"})), Some("about|default"))
            .unwrap();
        assert_eq!(moved.storage_key(), Some("company|default"));
        assert_eq!(moved.key(), "company|default");
        assert!(!dir.path().join("pages/about").exists());

        let index = flex.get_index().unwrap();
        assert!(index.contains("company|default"));
        assert!(!index.contains("about|default"));
        let page = flex.get_object("company|default").unwrap().unwrap();
        assert_eq!(page.get("title"), Some(&json!("About")));
    }
}
