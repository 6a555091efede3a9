/// Errors from cache operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The key is empty or contains a reserved character.
    #[error("invalid cache key {key:?}: {reason}")]
    InvalidArgument { key: String, reason: String },

    /// The cache backend cannot be reached.
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// A value could not be encoded or decoded.
    #[error("cache serialization error: {0}")]
    Serialization(String),
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
