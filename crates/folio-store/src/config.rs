use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Options for a hierarchical row storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    /// Data root, resolved through the storage's [`PathResolver`].
    pub folder: PathBuf,
    /// Extension of variant files, including the leading dot.
    pub extension: String,
    /// Descend into child folders when building the index.
    pub recurse: bool,
    /// File names skipped during scans.
    pub ignore_files: Vec<String>,
    /// Folder names skipped during scans.
    pub ignore_folders: Vec<String>,
    /// Skip entries whose name starts with a dot.
    pub ignore_hidden: bool,
    /// Order collections by the folder order prefix.
    pub manual_order: bool,
    /// Lower-case routes.
    pub force_lowercase_urls: bool,
    /// Template used when a new node has no variant to inherit from.
    pub default_template: String,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("pages"),
            extension: ".md".to_string(),
            recurse: true,
            ignore_files: vec![".DS_Store".to_string()],
            ignore_folders: vec![".git".to_string(), ".idea".to_string()],
            ignore_hidden: true,
            manual_order: true,
            force_lowercase_urls: false,
            default_template: "default".to_string(),
        }
    }
}

impl StorageOptions {
    /// Options rooted at `folder`, otherwise default.
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            ..Self::default()
        }
    }

    /// The file extension, always with a leading dot.
    pub fn data_ext(&self) -> String {
        if self.extension.starts_with('.') {
            self.extension.clone()
        } else {
            format!(".{}", self.extension)
        }
    }

    pub fn is_ignored_file(&self, name: &str) -> bool {
        self.ignore_files.iter().any(|f| f == name)
    }

    pub fn is_ignored_folder(&self, name: &str) -> bool {
        self.ignore_folders.iter().any(|f| f == name)
    }
}

/// Maps configured locations onto real filesystem paths.
pub trait PathResolver: Send + Sync + fmt::Debug {
    fn resolve(&self, path: &Path) -> PathBuf;
}

/// Resolves relative paths against a fixed base directory. Absolute paths
/// are returned unchanged.
#[derive(Clone, Debug, Default)]
pub struct RootResolver {
    base: PathBuf,
}

impl RootResolver {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl PathResolver for RootResolver {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let o = StorageOptions::default();
        assert_eq!(o.extension, ".md");
        assert!(o.recurse);
        assert!(o.ignore_hidden);
        assert!(o.manual_order);
        assert!(!o.force_lowercase_urls);
        assert_eq!(o.default_template, "default");
        assert!(o.is_ignored_folder(".git"));
        assert!(o.is_ignored_file(".DS_Store"));
    }

    #[test]
    fn extension_gains_leading_dot() {
        let mut o = StorageOptions::new("content");
        o.extension = "txt".into();
        assert_eq!(o.data_ext(), ".txt");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let o: StorageOptions = toml::from_str(
            r#"
            folder = "/srv/pages"
            recurse = false
            ignore_folders = ["drafts"]
            "#,
        )
        .unwrap();
        assert_eq!(o.folder, PathBuf::from("/srv/pages"));
        assert!(!o.recurse);
        assert!(o.is_ignored_folder("drafts"));
        assert!(!o.is_ignored_folder(".git"));
        assert_eq!(o.extension, ".md");
    }

    #[test]
    fn root_resolver_joins_relative_paths() {
        let resolver = RootResolver::new("/srv/site");
        assert_eq!(
            resolver.resolve(Path::new("pages")),
            PathBuf::from("/srv/site/pages")
        );
        assert_eq!(resolver.resolve(Path::new("/tmp/x")), PathBuf::from("/tmp/x"));
    }
}
