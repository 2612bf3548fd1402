//! Error types for the core module.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while resolving deferred values.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Cyclic reference detected: {chain}")]
    CyclicReference { chain: String },

    #[error("Unknown token marker: {0}")]
    UnknownToken(String),

    #[error("Unresolved reference to {producer}.{logical_name} from stack {consumer}")]
    UnresolvedReference {
        producer: String,
        consumer: String,
        logical_name: String,
    },

    #[error("Cannot embed {kind} in a string: {context}")]
    InvalidEmbedding { kind: String, context: String },

    #[error("Token map key must resolve to a string: {0}")]
    InvalidKey(String),

    #[error("Token resolution failed: {0}")]
    Resolution(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
