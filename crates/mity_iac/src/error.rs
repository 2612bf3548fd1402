//! Error types for synthesis.

use std::fmt;

use thiserror::Error;

use mity_core::{resolve, Prop, ReferenceTable, ResolveContext, TokenMap};

/// Result type alias for synthesis operations.
pub type IacResult<T> = Result<T, IacError>;

/// A validation failure attributed to a construct path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Construct path, `<stack>` or `<stack>/<logicalId>`.
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.path, self.message)
    }
}

fn list(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors that can occur while assembling or synthesizing an app.
#[derive(Error, Debug)]
pub enum IacError {
    #[error("Validation failed with {} error(s):\n{}", .0.len(), list(.0))]
    Validation(Vec<ValidationError>),

    #[error("Unknown stack: {0}")]
    UnknownStack(String),

    #[error("Stack already defined: {0}")]
    DuplicateStack(String),

    #[error("Resource already defined: {path}")]
    DuplicateResource { path: String },

    #[error("Cannot reference {producer} from {consumer}: {reason}")]
    CrossBoundary {
        producer: String,
        consumer: String,
        reason: String,
    },

    #[error("Stack dependency cycle: {}", path.join(" -> "))]
    StackCycle { path: Vec<String> },

    #[error("Stack {producer} exports different values as {logical_name}: {existing} and {requested}")]
    ExportConflict {
        producer: String,
        logical_name: String,
        existing: String,
        requested: String,
    },

    #[error("Generated logical id {logical_id} collides with an existing one in stack {stack}")]
    LogicalIdCollision { stack: String, logical_id: String },

    #[error("Invalid app definition: {0}")]
    InvalidDefinition(String),

    #[error("Resolution error: {0}")]
    Core(#[from] mity_core::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl IacError {
    /// Conflict between two targets exported under one logical name.
    pub(crate) fn export_conflict(producer: &str, logical_name: &str, existing: &Prop, requested: &Prop) -> Self {
        IacError::ExportConflict {
            producer: producer.to_string(),
            logical_name: logical_name.to_string(),
            existing: describe(existing),
            requested: describe(requested),
        }
    }

    /// Validation errors carried by this error, if any.
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            IacError::Validation(errors) => errors,
            _ => &[],
        }
    }
}

/// Render a target as template JSON when it carries no tokens.
fn describe(target: &Prop) -> String {
    let tokens = TokenMap::new();
    let references = ReferenceTable::new();
    match resolve(target, ResolveContext::new("", &tokens, &references)) {
        Ok(value) => value.to_string(),
        Err(_) => format!("{:?}", target),
    }
}
