use std::path::PathBuf;

use folio_store::StoreError;

/// Errors surfaced by the coordinator. Cache failures never appear here.
#[derive(Debug, thiserror::Error)]
pub enum FlexError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to read config {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Config(String),

    /// The storage accepted the call but returned no row for the object.
    #[error("{operation} rejected by storage for {key:?}")]
    Rejected { operation: &'static str, key: String },
}

/// Result alias for coordinator operations.
pub type FlexResult<T> = Result<T, FlexError>;
