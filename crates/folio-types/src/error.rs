use thiserror::Error;

/// Errors produced while decoding or validating storage keys.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The key string violates the storage key grammar.
    #[error("malformed storage key {key:?}: {reason}")]
    Malformed { key: String, reason: String },

    /// A key component holds a value outside the legal domain.
    #[error("invalid {field} {value:?}: {reason}")]
    InvalidComponent {
        field: &'static str,
        value: String,
        reason: String,
    },
}

impl KeyError {
    pub(crate) fn malformed(key: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn component(field: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidComponent {
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias for key results.
pub type KeyResult<T> = Result<T, KeyError>;
