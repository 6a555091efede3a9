//! Row storage over a tree of page folders.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use folio_index::{MetaIndex, MetaIndexer, Reload};
use folio_store::{
    ExistingKeys, PathResolver, ReadRows, RowResults, RowStorage, StorageOptions, StoreError,
    StoreResult,
};
use folio_types::{ObjectMeta, Row, RowData, RowMeta, StorageKey};
use tracing::{debug, warn};

use crate::file;
use crate::relocate::{copy_folder, move_folder, rename_file};

/// Hierarchical row storage: one folder per node, one file per variant.
///
/// ```text
/// data_root/[parent/][NN.]folder/template[.lang].ext
/// ```
///
/// Keys can move: saving a row whose key fields differ from the key it was
/// loaded from moves (or copies) the folder and renames (or clones) the
/// variant file. Random key allocation is not supported; every new row must
/// name its folder.
pub struct PageStorage {
    options: StorageOptions,
    indexer: MetaIndexer,
    index: RwLock<Option<Arc<MetaIndex>>>,
}

impl PageStorage {
    /// Create a storage for `options`, resolving the data root through
    /// `resolver`.
    pub fn new(options: StorageOptions, resolver: &dyn PathResolver) -> Self {
        let root = resolver.resolve(&options.folder);
        Self {
            indexer: MetaIndexer::new(root, options.clone()),
            options,
            index: RwLock::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        self.indexer.root()
    }

    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    pub fn indexer(&self) -> &MetaIndexer {
        &self.indexer
    }

    /// Snapshot of the node index, built on first use.
    pub fn index(&self) -> StoreResult<Arc<MetaIndex>> {
        if let Some(index) = self.index.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(Arc::clone(index));
        }
        let index = Arc::new(self.indexer.build_index()?);
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Meta of the variant addressed by `key`.
    pub fn object_meta(&self, key: &str, reload: Reload) -> StoreResult<ObjectMeta> {
        Ok(self.indexer.object_meta(key, reload)?)
    }

    /// The raw contents of the variant file.
    pub fn read_raw(&self, key: &str) -> StoreResult<String> {
        let path = self.get_path_from_key(key)?;
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(key.to_string()),
            _ => StoreError::Io(e),
        })
    }

    /// The frontmatter of the variant file, without delimiters. Empty when
    /// the file has none.
    pub fn read_frontmatter(&self, key: &str) -> StoreResult<String> {
        let raw = self.read_raw(key)?;
        let (header, _) = file::split_frontmatter(&raw);
        Ok(header.unwrap_or_default().to_string())
    }

    fn parse_key(key: &str) -> StoreResult<StorageKey> {
        let key = StorageKey::parse(key)?;
        key.validate()?;
        Ok(key)
    }

    fn variant_path(&self, key: &StorageKey) -> StoreResult<PathBuf> {
        Ok(self.indexer.build_path(key)?.path())
    }

    /// Meta of `key` as seen by the current index snapshot, falling back to
    /// a direct scan when there is no snapshot or it lacks the node.
    fn indexed_object_meta(&self, key: &StorageKey) -> StoreResult<ObjectMeta> {
        let snapshot = self
            .index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match snapshot.as_ref().and_then(|index| index.get(&key.folder_key())) {
            Some(meta) => Ok(meta.object_meta(key)),
            None => self.object_meta(&key.build(true), Reload::IfMissing),
        }
    }

    /// Drop cached metas around `key` and the index snapshot.
    fn invalidate_node(&self, key: &StorageKey) {
        let cache = self.indexer.meta_cache();
        cache.invalidate_subtree(&key.folder_key());
        cache.invalidate(&key.parent_key);
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn read_row_at(&self, key: &str) -> StoreResult<Option<Row>> {
        let storage_key = Self::parse_key(key)?;
        let path = self.variant_path(&storage_key)?;
        if !path.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        let data = file::decode(&raw)?;
        let object = self.indexed_object_meta(&storage_key)?;
        Ok(Some(Row::new(data).with_meta(RowMeta {
            storage_key: Some(key.to_string()),
            object: Some(object),
            ..RowMeta::default()
        })))
    }

    /// Persist `row` under `target`, relocating it from `source` first when
    /// the keys differ. Both keys must already have their template resolved.
    fn save_row(
        &self,
        source: Option<&StorageKey>,
        target: &StorageKey,
        row: Row,
    ) -> StoreResult<Row> {
        let result = self.relocate_and_write(source, target, row);
        if let Some(source) = source {
            self.invalidate_node(source);
        }
        self.invalidate_node(target);
        let data = result?;

        let new_key = target.build(true);
        let object = self.object_meta(&new_key, Reload::Force)?;
        Ok(Row::new(data).with_meta(RowMeta {
            storage_key: Some(new_key),
            object: Some(object),
            ..RowMeta::default()
        }))
    }

    fn relocate_and_write(
        &self,
        source: Option<&StorageKey>,
        target: &StorageKey,
        row: Row,
    ) -> StoreResult<RowData> {
        let new_path = self.indexer.build_path(target)?;

        if let Some(source) = source.filter(|s| *s != target) {
            let old_path = self.indexer.build_path(source)?;

            if old_path.folder != new_path.folder && old_path.folder.is_dir() {
                if row.meta.copy {
                    copy_folder(&old_path.folder, &new_path.folder)?;
                    debug!(from = %old_path.folder.display(), to = %new_path.folder.display(), "page copied");
                } else {
                    move_folder(&old_path.folder, &new_path.folder)?;
                    debug!(from = %old_path.folder.display(), to = %new_path.folder.display(), "page moved");
                }
            }

            if old_path.filename != new_path.filename {
                let old_file = new_path.folder.join(&old_path.filename);
                if !row.meta.clone && old_file.is_file() {
                    rename_file(&old_file, &new_path.path())?;
                    debug!(from = %old_path.filename, to = %new_path.filename, "page template changed");
                } else {
                    debug!(filename = %new_path.filename, "page template created");
                }
            }
        }

        let data = row.into_persisted();
        let contents = file::encode(&data)?;
        let path = new_path.path();
        fs::create_dir_all(&new_path.folder).map_err(|e| StoreError::write(&new_path.folder, e))?;
        fs::write(&path, contents).map_err(|e| StoreError::write(&path, e))?;
        debug!(path = %path.display(), "page saved");
        Ok(data)
    }

    /// Key a new row is created under: the given key (or the row's source
    /// key) overridden by the row's own key fields.
    fn creation_key(&self, key: Option<&str>, row: &Row) -> StoreResult<Option<StorageKey>> {
        let base = match key {
            Some(key) => Some(Self::parse_key(key)?),
            None => row.source_key()?,
        };
        let target = row.target_key(base.as_ref())?;
        match target {
            Some(target) => Ok(Some(self.indexer.resolve_template(&target)?)),
            None => Ok(None),
        }
    }

    fn create_row(&self, key: &StorageKey, row: Row) -> StoreResult<Option<Row>> {
        if self.variant_path(key)?.is_file() {
            debug!(key = %key, "page already exists, not created");
            return Ok(None);
        }
        self.save_row(None, key, row).map(Some)
    }

    fn update_row(&self, key: &str, row: Row) -> StoreResult<Option<Row>> {
        let source = self.indexer.resolve_template(&Self::parse_key(key)?)?;
        if !self.variant_path(&source)?.is_file() {
            return Ok(None);
        }
        let target = match row.target_key(Some(&source))? {
            Some(target) => self.indexer.resolve_template(&target)?,
            None => source.clone(),
        };
        self.save_row(Some(&source), &target, row).map(Some)
    }

    fn replace_row(&self, key: &str, row: Row) -> StoreResult<Option<Row>> {
        let source = self.indexer.resolve_template(&Self::parse_key(key)?)?;
        let exists = self.variant_path(&source)?.is_file();
        let target = match row.target_key(Some(&source))? {
            Some(target) => self.indexer.resolve_template(&target)?,
            None => source.clone(),
        };
        let source = exists.then_some(&source);
        self.save_row(source, &target, row).map(Some)
    }

    fn delete_row(&self, key: &str) -> StoreResult<Option<Row>> {
        let storage_key = self.indexer.resolve_template(&Self::parse_key(key)?)?;
        let Some(row) = self.read_row_at(&storage_key.build(true))? else {
            return Ok(None);
        };
        let path = self.indexer.build_path(&storage_key)?;

        let result = if can_delete_folder(&storage_key) {
            fs::remove_dir_all(&path.folder).map_err(|e| StoreError::write(&path.folder, e))
        } else {
            fs::remove_file(path.path()).map_err(|e| StoreError::write(path.path(), e))
        };
        self.invalidate_node(&storage_key);
        result?;

        debug!(key = %storage_key, "page deleted");
        Ok(Some(row))
    }
}

/// A folder holding a translated variant is shared with its other
/// languages and must survive deleting that variant.
fn can_delete_folder(key: &StorageKey) -> bool {
    key.lang.is_empty()
}

/// Per-row failures that leave the rest of the batch running.
fn is_row_error(err: &StoreError) -> bool {
    !matches!(
        err,
        StoreError::StorageWrite { .. } | StoreError::Unsupported(_)
    )
}

fn collect_row(
    results: &mut RowResults,
    operation: &str,
    key: String,
    outcome: StoreResult<Option<Row>>,
) -> StoreResult<()> {
    match outcome {
        Ok(row) => {
            results.insert(key, row);
            Ok(())
        }
        Err(err) if is_row_error(&err) => {
            warn!(key = %key, error = %err, operation, "row skipped");
            results.insert(key, None);
            Ok(())
        }
        Err(err) => Err(err),
    }
}

impl RowStorage for PageStorage {
    fn get_existing_keys(&self) -> StoreResult<ExistingKeys> {
        Ok(self.index()?.existing_keys())
    }

    fn has_key(&self, key: &str) -> StoreResult<bool> {
        Ok(self.variant_path(&Self::parse_key(key)?)?.is_file())
    }

    /// Keyless rows whose own key fields are malformed are reported under
    /// their position in `rows`.
    fn create_rows(&self, rows: Vec<(Option<String>, Row)>) -> StoreResult<RowResults> {
        let mut results = RowResults::new();
        for (position, (key, row)) in rows.into_iter().enumerate() {
            let target = match self.creation_key(key.as_deref(), &row) {
                Ok(Some(target)) => target,
                Ok(None) => {
                    return Err(StoreError::Unsupported(
                        "generating random keys is disabled for pages".to_string(),
                    ))
                }
                Err(err) => {
                    let key = key.unwrap_or_else(|| position.to_string());
                    collect_row(&mut results, "create", key, Err(err))?;
                    continue;
                }
            };
            let outcome = self.create_row(&target, row);
            collect_row(&mut results, "create", target.build(true), outcome)?;
        }
        Ok(results)
    }

    fn read_rows(&self, rows: BTreeMap<String, Option<Row>>) -> StoreResult<ReadRows> {
        let mut result = ReadRows::default();
        for (key, row) in rows {
            if let Some(row) = row {
                result.rows.insert(key, Some(row));
                continue;
            }
            let outcome = self.read_row_at(&key);
            if let Ok(Some(row)) = &outcome {
                result.fetched.insert(key.clone(), row.clone());
            }
            collect_row(&mut result.rows, "read", key, outcome)?;
        }
        Ok(result)
    }

    fn update_rows(&self, rows: BTreeMap<String, Row>) -> StoreResult<RowResults> {
        let mut results = RowResults::new();
        for (key, row) in rows {
            let outcome = self.update_row(&key, row);
            collect_row(&mut results, "update", key, outcome)?;
        }
        Ok(results)
    }

    fn delete_rows(&self, rows: BTreeMap<String, Row>) -> StoreResult<RowResults> {
        let mut results = RowResults::new();
        for key in rows.into_keys() {
            let outcome = self.delete_row(&key);
            collect_row(&mut results, "delete", key, outcome)?;
        }
        Ok(results)
    }

    fn replace_rows(&self, rows: BTreeMap<String, Row>) -> StoreResult<RowResults> {
        let mut results = RowResults::new();
        for (key, row) in rows {
            let outcome = self.replace_row(&key, row);
            collect_row(&mut results, "replace", key, outcome)?;
        }
        Ok(results)
    }

    fn get_path_from_key(&self, key: &str) -> StoreResult<PathBuf> {
        self.variant_path(&Self::parse_key(key)?)
    }

    fn logical_key(&self, storage_key: &str) -> StoreResult<String> {
        Ok(self.indexer.logical_key(&Self::parse_key(storage_key)?))
    }

    fn invalidate_index(&self) {
        self.indexer.meta_cache().invalidate_all();
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl std::fmt::Debug for PageStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let indexed = self
            .index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|index| index.len());
        f.debug_struct("PageStorage")
            .field("root", &self.root())
            .field("indexed_nodes", &indexed)
            .finish()
    }
}
