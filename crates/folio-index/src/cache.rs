use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use folio_types::Meta;

/// Whether a meta lookup may be answered from the [`MetaCache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reload {
    /// Rescan the folder even if a cached meta exists.
    Force,
    /// Use the cached meta when present.
    IfMissing,
}

/// In-memory cache of scanned node metas, keyed by folder key.
///
/// Holds metas exactly as scanned: the timestamps propagated by an index
/// build live only in that index.
#[derive(Default)]
pub struct MetaCache {
    entries: RwLock<HashMap<String, Meta>>,
}

impl MetaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Meta> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: impl Into<String>, meta: Meta) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), meta);
    }

    /// Drop the meta of one node.
    pub fn invalidate(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Drop the meta of `key` and of every node below it.
    pub fn invalidate_subtree(&self, key: &str) {
        let key = key.trim_matches('/');
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if key.is_empty() {
            entries.clear();
            return;
        }
        let prefix = format!("{key}/");
        entries.retain(|k, _| k != key && !k.starts_with(&prefix));
    }

    pub fn invalidate_all(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for MetaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaCache")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with(keys: &[&str]) -> MetaCache {
        let cache = MetaCache::new();
        for key in keys {
            cache.insert(*key, Meta::missing(*key, *key));
        }
        cache
    }

    #[test]
    fn insert_and_get() {
        let cache = cache_with(&["blog"]);
        assert_eq!(cache.get("blog").unwrap().storage_key, "blog");
        assert!(cache.get("news").is_none());
    }

    #[test]
    fn invalidate_single_key() {
        let cache = cache_with(&["blog", "blog/post"]);
        cache.invalidate("blog");
        assert!(cache.get("blog").is_none());
        assert!(cache.get("blog/post").is_some());
    }

    #[test]
    fn invalidate_subtree_spares_siblings_with_shared_prefix() {
        let cache = cache_with(&["blog", "blog/post", "blog/post/_hero", "blogroll"]);
        cache.invalidate_subtree("blog");
        assert!(cache.get("blog").is_none());
        assert!(cache.get("blog/post").is_none());
        assert!(cache.get("blog/post/_hero").is_none());
        assert!(cache.get("blogroll").is_some());
    }

    #[test]
    fn invalidate_root_subtree_clears_everything() {
        let cache = cache_with(&["", "blog", "about"]);
        cache.invalidate_subtree("");
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_all() {
        let cache = cache_with(&["a", "b"]);
        cache.invalidate_all();
        assert_eq!(cache.len(), 0);
    }
}
