//! Error types for the bridge runtime.

use thiserror::Error;

/// Result type alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors that can occur while a bridge handler runs.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Exports not found in store: {}", keys.join(", "))]
    MissingKeys { keys: Vec<String> },

    #[error("Export store error: {message}")]
    Store { message: String, retryable: bool },

    #[error("Key {key} is outside namespace {namespace}")]
    KeyOutsideNamespace { key: String, namespace: String },

    #[error("Export {key} is still in use by: {}", consumers.join(", "))]
    ExportInUse { key: String, consumers: Vec<String> },

    #[error("Invalid lifecycle event: {0}")]
    InvalidEvent(String),

    #[error("Unsupported resource type: {0}")]
    UnsupportedResourceType(String),

    #[error("Bridge invocation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Completion callback failed: {0}")]
    Completion(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Store failure that may succeed when retried.
    pub fn transient(message: impl Into<String>) -> Self {
        BridgeError::Store {
            message: message.into(),
            retryable: true,
        }
    }

    /// Store failure that will not go away on retry.
    pub fn permanent(message: impl Into<String>) -> Self {
        BridgeError::Store {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::Store { retryable: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_store_errors_retry() {
        assert!(BridgeError::transient("throttled").is_retryable());
        assert!(!BridgeError::permanent("denied").is_retryable());
        assert!(!BridgeError::MissingKeys { keys: vec!["/a".into()] }.is_retryable());
        assert!(!BridgeError::Timeout(10).is_retryable());
    }

    #[test]
    fn test_missing_keys_message_lists_keys() {
        let err = BridgeError::MissingKeys {
            keys: vec!["/mity/exports/A/X".into(), "/mity/exports/A/Y".into()],
        };
        assert_eq!(
            err.to_string(),
            "Exports not found in store: /mity/exports/A/X, /mity/exports/A/Y"
        );
    }
}
