//! Node meta computation and whole-tree index building.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use folio_store::{ExistingKeys, KeyEntry, StorageOptions};
use folio_types::{
    split_params, strip_order_prefixes, Meta, NaturalKey, ObjectMeta, StorageKey, MODULE_MARKER,
    PARAMS_DELIMITER,
};
use tracing::{debug, trace, warn};

use crate::cache::{MetaCache, Reload};
use crate::error::{IndexError, IndexResult};
use crate::scan::scan_folder;

/// Folder and file name of one variant on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodePath {
    pub folder: PathBuf,
    pub filename: String,
}

impl NodePath {
    pub fn path(&self) -> PathBuf {
        self.folder.join(&self.filename)
    }
}

/// Every node of the tree keyed by folder key (the root is `""`), in
/// natural order, with child timestamps resolved and modular timestamps
/// propagated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetaIndex {
    nodes: BTreeMap<NaturalKey, Meta>,
}

impl MetaIndex {
    pub fn get(&self, key: &str) -> Option<&Meta> {
        self.nodes.get(&NaturalKey::from(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Meta)> {
        self.nodes.iter().map(|(k, m)| (k.as_str(), m))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Project the index onto the objects it contains.
    ///
    /// Each variant file is one object, keyed by `route|template[.lang]` and
    /// stored under `folder_key|template[.lang]`. Its timestamp is the file's
    /// mtime raised to the newest modular child. The root node, nodes
    /// without variants and variants whose template contains a dot (which no
    /// storage key can address) are not objects.
    ///
    /// Folders that differ only in their order prefix share a route. The
    /// object whose storage key already is its route keeps it, then the
    /// first in folder order; the others are keyed by their storage key.
    pub fn existing_keys(&self) -> ExistingKeys {
        let mut candidates = Vec::new();
        for (folder_key, meta) in self.iter() {
            if folder_key.is_empty() {
                continue;
            }
            let modular = meta.modular_timestamp();
            for (lang, template, mtime) in meta.variants() {
                if template.contains('.') {
                    continue;
                }
                let params = if lang.is_empty() {
                    template.to_string()
                } else {
                    format!("{template}.{lang}")
                };
                candidates.push((
                    object_key(&meta.key, &params),
                    KeyEntry::new(object_key(folder_key, &params), mtime.max(modular)),
                ));
            }
        }
        candidates.sort_by_key(|(key, entry)| *key != entry.storage_key);

        let mut keys = ExistingKeys::new();
        for (key, entry) in candidates {
            if !keys.contains_key(&key) {
                keys.insert(key, entry);
                continue;
            }
            let fallback = entry.storage_key.clone();
            if keys.contains_key(&fallback) {
                warn!(key = %key, storage_key = %fallback, "object key taken twice, skipped");
                continue;
            }
            warn!(key = %key, storage_key = %fallback, "object key taken, keyed by storage key");
            keys.insert(fallback, entry);
        }
        keys
    }

    pub fn into_inner(self) -> BTreeMap<NaturalKey, Meta> {
        self.nodes
    }
}

/// Join a route (or folder key) and variant params into an object key.
pub fn object_key(path: &str, params: &str) -> String {
    if params.is_empty() {
        path.to_string()
    } else {
        format!("{path}{PARAMS_DELIMITER}{params}")
    }
}

/// Computes node metas for one data root and aggregates them into a
/// [`MetaIndex`].
#[derive(Debug)]
pub struct MetaIndexer {
    root: PathBuf,
    options: StorageOptions,
    cache: MetaCache,
}

impl MetaIndexer {
    /// Create an indexer over the already resolved data root `root`.
    pub fn new(root: impl Into<PathBuf>, options: StorageOptions) -> Self {
        Self {
            root: root.into(),
            options,
            cache: MetaCache::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    pub fn meta_cache(&self) -> &MetaCache {
        &self.cache
    }

    /// Resolve a folder key to a path inside the data root.
    ///
    /// Params are ignored. Empty, `.` and `..` segments are rejected.
    pub fn folder_path(&self, key: &str) -> IndexResult<PathBuf> {
        let folder_key = normalize_folder_key(key)?;
        let mut path = self.root.clone();
        if !folder_key.is_empty() {
            path.extend(folder_key.split('/'));
        }
        Ok(path)
    }

    /// Compute the meta of the node addressed by `key`.
    ///
    /// A folder that does not exist yields a zeroed meta. Scanned metas are
    /// cached until invalidated or recomputed with [`Reload::Force`].
    pub fn compute_meta(&self, key: &str, reload: Reload) -> IndexResult<Meta> {
        let folder_key = normalize_folder_key(key)?;
        if reload == Reload::IfMissing {
            if let Some(meta) = self.cache.get(&folder_key) {
                return Ok(meta);
            }
        }

        let path = self.folder_path(&folder_key)?;
        let route = self.route(&folder_key);
        let meta = if path.is_dir() {
            let scan = scan_folder(&path, &self.options)?;
            let mut meta = Meta {
                key: route,
                storage_key: folder_key.clone(),
                template: None,
                storage_timestamp: scan.storage_timestamp,
                markdown: scan.markdown,
                children: scan.children,
                checksum: String::new(),
            };
            meta.template = meta.default_template().map(str::to_string);
            meta.seal();
            meta
        } else {
            Meta::missing(route, folder_key.clone())
        };

        trace!(key = %folder_key, checksum = %meta.checksum, "computed node meta");
        self.cache.insert(folder_key, meta.clone());
        Ok(meta)
    }

    /// Compute the meta of `key` resolved for its variant params.
    pub fn object_meta(&self, key: &str, reload: Reload) -> IndexResult<ObjectMeta> {
        let storage_key = StorageKey::parse(key)?;
        let meta = self.compute_meta(&storage_key.folder_key(), reload)?;
        Ok(meta.object_meta(&storage_key))
    }

    /// Fill in an empty template from the node meta.
    ///
    /// The first template of the key's language wins, then the node default;
    /// a node without variants falls back to the configured default template.
    pub fn resolve_template(&self, key: &StorageKey) -> IndexResult<StorageKey> {
        if !key.template.is_empty() {
            return Ok(key.clone());
        }
        let template = self
            .compute_meta(&key.folder_key(), Reload::IfMissing)?
            .object_meta(key)
            .template
            .unwrap_or_else(|| self.options.default_template.clone());
        Ok(key.clone().with_template(template))
    }

    /// The key [`MetaIndex::existing_keys`] lists the object stored under
    /// `key` by, unless its route is shared with another folder.
    pub fn logical_key(&self, key: &StorageKey) -> String {
        object_key(&self.route(&key.folder_key()), &key.params())
    }

    /// Resolve the folder and variant file name of `key`.
    pub fn build_path(&self, key: &StorageKey) -> IndexResult<NodePath> {
        let key = self.resolve_template(key)?;
        let folder = self.folder_path(&key.folder_key())?;

        let mut filename = key.template;
        if !key.lang.is_empty() {
            filename.push('.');
            filename.push_str(&key.lang);
        }
        filename.push_str(&self.options.data_ext());

        Ok(NodePath { folder, filename })
    }

    /// Build the full index, starting from the data root.
    ///
    /// Uses cached metas where available. Child timestamps are filled in and
    /// modular children raise their parent's timestamp; every meta touched
    /// that way is resealed.
    pub fn build_index(&self) -> IndexResult<MetaIndex> {
        let mut queue = vec![String::new()];
        let mut nodes = BTreeMap::new();

        while let Some(current) = queue.pop() {
            let meta = self.compute_meta(&current, Reload::IfMissing)?;
            if self.options.recurse || current.is_empty() {
                let prefix = if current.is_empty() {
                    String::new()
                } else {
                    format!("{current}/")
                };
                queue.extend(meta.children.keys().map(|child| format!("{prefix}{child}")));
            }
            nodes.insert(NaturalKey::from(current), meta);
        }

        let keys: Vec<NaturalKey> = nodes.keys().rev().cloned().collect();
        let mut touched = BTreeSet::new();
        for key in keys {
            if key.is_empty() {
                continue;
            }
            let (parent_key, basename) = key.rsplit_once('/').unwrap_or(("", key.as_str()));
            let Some(timestamp) = nodes.get(&key).map(|m| m.storage_timestamp) else {
                continue;
            };
            let Some(parent) = nodes.get_mut(&NaturalKey::from(parent_key)) else {
                continue;
            };
            let Some(slot) = parent.children.get_mut(&NaturalKey::from(basename)) else {
                continue;
            };
            *slot = Some(timestamp);
            if basename.starts_with(MODULE_MARKER) {
                parent.storage_timestamp = parent.storage_timestamp.max(timestamp);
            }
            touched.insert(NaturalKey::from(parent_key));
        }

        for key in &touched {
            if let Some(meta) = nodes.get_mut(key) {
                meta.seal();
            }
        }

        debug!(
            root = %self.root.display(),
            nodes = nodes.len(),
            recurse = self.options.recurse,
            "built node index"
        );
        Ok(MetaIndex { nodes })
    }

    fn route(&self, folder_key: &str) -> String {
        let route = strip_order_prefixes(folder_key);
        if self.options.force_lowercase_urls {
            route.to_lowercase()
        } else {
            route
        }
    }
}

/// Strip params and surrounding slashes, rejecting segments that would
/// leave the data root.
fn normalize_folder_key(key: &str) -> IndexResult<String> {
    let (path, _) = split_params(key);
    let path = path.trim_matches('/');
    if path.is_empty() {
        return Ok(String::new());
    }
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(IndexError::invalid_path(
                key,
                format!("illegal path segment {segment:?}"),
            ));
        }
    }
    Ok(path.to_string())
}
