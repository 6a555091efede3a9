use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use folio_cache::{Cache, MemoryCache, NullCache, DEFAULT_CAPACITY};
use folio_store::StorageOptions;
use serde::{Deserialize, Serialize};

use crate::error::{FlexError, FlexResult};
use crate::object::ObjectKind;

/// Default cache lifetime in seconds.
pub const DEFAULT_CACHE_LIFETIME_SECS: u64 = 60;

/// Configuration of one object type.
///
/// ```toml
/// type_name = "pages"
/// kind = "page"
///
/// [storage]
/// type = "pages"
/// folder = "user/pages"
///
/// [cache]
/// lifetime_secs = 120
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlexConfig {
    /// Name of the type; also namespaces its cache entries.
    pub type_name: String,
    pub kind: ObjectKind,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
}

impl Default for FlexConfig {
    fn default() -> Self {
        Self {
            type_name: "objects".to_string(),
            kind: ObjectKind::default(),
            storage: StorageConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl FlexConfig {
    /// A config for `type_name`, otherwise default.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> FlexResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| FlexError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> FlexResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| FlexError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> FlexResult<()> {
        if self.type_name.is_empty() {
            return Err(FlexError::Config("type_name must not be empty".to_string()));
        }
        if let StorageConfig::Pages(options) = &self.storage {
            if options.folder.as_os_str().is_empty() {
                return Err(FlexError::Config("storage folder must not be empty".to_string()));
            }
        }
        Ok(())
    }

    /// Whether collections follow the storage's manual ordering.
    pub fn manual_order(&self) -> bool {
        match &self.storage {
            StorageConfig::Memory => false,
            StorageConfig::Pages(options) => options.manual_order,
        }
    }

    pub fn cache_namespace(&self) -> String {
        format!("flex-objects-{}", self.type_name)
    }
}

/// Which row storage backs the type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    #[default]
    Memory,
    Pages(StorageOptions),
}

/// Row and index caching for the type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Entry lifetime; `0` keeps entries until they are evicted or cleared.
    pub lifetime_secs: u64,
    /// Maximum number of cached entries.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lifetime_secs: DEFAULT_CACHE_LIFETIME_SECS,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl CacheConfig {
    /// Build the cache described by this config under `namespace`.
    pub fn build(&self, namespace: &str) -> Arc<dyn Cache> {
        if !self.enabled {
            return Arc::new(NullCache);
        }
        let mut cache = MemoryCache::new(self.capacity);
        if self.lifetime_secs > 0 {
            cache = cache.with_default_ttl(Duration::from_secs(self.lifetime_secs));
        }
        Arc::new(cache.namespace(namespace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn defaults() {
        let config = FlexConfig::default();
        assert_eq!(config.type_name, "objects");
        assert_eq!(config.kind, ObjectKind::Generic);
        assert_eq!(config.storage, StorageConfig::Memory);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.lifetime_secs, 60);
        assert!(!config.manual_order());
        assert_eq!(config.cache_namespace(), "flex-objects-objects");
    }

    #[test]
    fn parse_pages_config() {
        let config = FlexConfig::from_toml_str(
            r#"
            type_name = "pages"
            kind = "page"

            [storage]
            type = "pages"
            folder = "user/pages"
            manual_order = false

            [cache]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.kind, ObjectKind::Page);
        match &config.storage {
            StorageConfig::Pages(options) => {
                assert_eq!(options.folder, PathBuf::from("user/pages"));
                assert_eq!(options.extension, ".md");
                assert!(!options.manual_order);
            }
            other => panic!("expected pages storage, got {other:?}"),
        }
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn unknown_storage_type_is_rejected() {
        let result = FlexConfig::from_toml_str("[storage]\ntype = \"redis\"\n");
        assert!(matches!(result, Err(FlexError::Config(_))));
    }

    #[test]
    fn empty_type_name_is_rejected() {
        assert!(FlexConfig::from_toml_str("type_name = \"\"").is_err());
    }

    #[test]
    fn load_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        match FlexConfig::load(&path) {
            Err(FlexError::ConfigRead { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected read error, got {other:?}"),
        }
    }

    #[test]
    fn disabled_cache_never_hits() {
        let cache = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        }
        .build("test");
        cache.set("a", json!(1), None).unwrap();
        assert_eq!(cache.get("a").unwrap(), None);
    }

    #[test]
    fn enabled_cache_stores() {
        let cache = CacheConfig::default().build("test");
        cache.set("a", json!(1), None).unwrap();
        assert_eq!(cache.get("a").unwrap(), Some(json!(1)));
    }
}
