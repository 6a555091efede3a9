//! Error types for the index crate.

use std::path::PathBuf;

use folio_store::StoreError;
use folio_types::KeyError;

/// Errors that can occur while scanning nodes or building the index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The node key does not name a folder inside the data root.
    #[error("invalid node path {key:?}: {reason}")]
    InvalidPath { key: String, reason: String },

    /// A folder could not be listed.
    #[error("failed to scan {}: {source}", .path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The storage key could not be decoded.
    #[error(transparent)]
    Key(#[from] KeyError),
}

impl IndexError {
    pub(crate) fn invalid_path(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<IndexError> for StoreError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::InvalidPath { key, reason } => {
                StoreError::MalformedKey(KeyError::Malformed { key, reason })
            }
            IndexError::Key(err) => StoreError::MalformedKey(err),
            err @ IndexError::Scan { .. } => StoreError::Index(err.to_string()),
        }
    }
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
