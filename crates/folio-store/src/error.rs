use std::path::PathBuf;

use folio_types::KeyError;

/// Errors from row storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The key violates the storage key grammar or escapes the data root.
    #[error("malformed key: {0}")]
    MalformedKey(#[from] KeyError),

    /// A filesystem write, rename, or copy failed.
    ///
    /// `target` is set for two-path operations (moves, copies, renames) so a
    /// partially relocated tree can be diagnosed.
    #[error("storage write failed at {}{}: {source}", .path.display(), target_suffix(.target))]
    StorageWrite {
        path: PathBuf,
        target: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    /// The backend does not support the requested operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The requested row does not exist.
    #[error("row not found: {0}")]
    NotFound(String),

    /// Row payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The node index could not be built.
    #[error("index error: {0}")]
    Index(String),

    /// I/O error while reading from the backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn target_suffix(target: &Option<PathBuf>) -> String {
    target
        .as_ref()
        .map(|t| format!(" -> {}", t.display()))
        .unwrap_or_default()
}

impl StoreError {
    /// Failure writing a single path.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StorageWrite {
            path: path.into(),
            target: None,
            source,
        }
    }

    /// Failure relocating `path` to `target`.
    pub fn relocate(
        path: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::StorageWrite {
            path: path.into(),
            target: Some(target.into()),
            source,
        }
    }
}

/// Result alias for row storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn relocate_error_names_both_paths() {
        let err = StoreError::relocate(
            "/data/about",
            "/data/03.about",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let message = err.to_string();
        assert!(message.contains("/data/about -> /data/03.about"));
        assert!(message.contains("denied"));
    }

    #[test]
    fn write_error_names_path() {
        let err = StoreError::write("/data/about/default.md", io::Error::other("disk full"));
        assert_eq!(
            err.to_string(),
            "storage write failed at /data/about/default.md: disk full"
        );
    }

    #[test]
    fn key_errors_convert() {
        let err: StoreError = folio_types::StorageKey::parse("").unwrap_err().into();
        assert!(matches!(err, StoreError::MalformedKey(_)));
    }
}
