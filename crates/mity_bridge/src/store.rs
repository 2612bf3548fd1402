//! Export store abstraction and naming conventions.
//!
//! Exports live in a regional key-value store under
//! `/<prefix>/<producingStack>/<logicalName>`. Each producing stack owns its
//! namespace; readers only ever read from one producer's namespace per key.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::BridgeResult;

/// Default store prefix.
pub const DEFAULT_PREFIX: &str = "mity/exports";

/// Resource type of the generated reader.
pub const READER_RESOURCE_TYPE: &str = "Custom::MityExportReader";

/// Resource type of the generated writer.
pub const WRITER_RESOURCE_TYPE: &str = "Custom::MityExportWriter";

/// Property holding [`ReaderProps`] on the reader resource.
pub const READER_PROPS_KEY: &str = "ReaderProps";

/// Property holding [`WriterProps`] on the writer resource.
pub const WRITER_PROPS_KEY: &str = "WriterProps";

/// Tag name prefix for consumer holds on an export.
pub const STRONG_REF_TAG_PREFIX: &str = "mity:strong-ref:";

/// Store actions a reader needs.
pub const READER_ACTIONS: [&str; 3] = [
    "ssm:GetParameters",
    "ssm:AddTagsToResource",
    "ssm:RemoveTagsFromResource",
];

/// Store actions a writer needs.
pub const WRITER_ACTIONS: [&str; 4] = [
    "ssm:PutParameter",
    "ssm:DeleteParameters",
    "ssm:ListTagsForResource",
    "ssm:GetParameters",
];

fn trimmed(prefix: &str) -> &str {
    prefix.trim_matches('/')
}

/// Full store key of an export.
pub fn export_key(prefix: &str, producer: &str, logical_name: &str) -> String {
    format!("/{}/{}/{}", trimmed(prefix), producer, logical_name)
}

/// Namespace owned by `producer`, with trailing slash.
pub fn producer_namespace(prefix: &str, producer: &str) -> String {
    format!("/{}/{}/", trimmed(prefix), producer)
}

/// Producing stack encoded in `key`, if it lives under `prefix`.
pub fn producer_of(prefix: &str, key: &str) -> Option<String> {
    let root = format!("/{}/", trimmed(prefix));
    let rest = key.strip_prefix(&root)?;
    let (producer, name) = rest.split_once('/')?;
    if producer.is_empty() || name.is_empty() {
        None
    } else {
        Some(producer.to_string())
    }
}

/// Identity of a reader instance derived from its key set.
///
/// Changes whenever the key set changes, so the platform re-invokes the
/// reader on update.
pub fn reader_identity<'a>(keys: impl IntoIterator<Item = &'a String>) -> String {
    let mut sorted: Vec<&String> = keys.into_iter().collect();
    sorted.sort();
    sorted.dedup();

    let mut hasher = Sha256::new();
    for key in sorted {
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
    }
    let digest = hex::encode(hasher.finalize());
    format!("exports-reader-{}", &digest[..16])
}

/// Input properties of a reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderProps {
    /// Region of the producing stack's store.
    pub region: String,
    /// Store prefix.
    pub prefix: String,
    /// Store key to placeholder value.
    pub imports: BTreeMap<String, String>,
}

/// Input properties of a writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriterProps {
    /// Region of the producing stack's store.
    pub region: String,
    /// Store prefix.
    pub prefix: String,
    /// Store key to exported value.
    pub exports: BTreeMap<String, String>,
}

/// Regional key-value store holding exports.
#[async_trait]
pub trait ExportStore: Send + Sync {
    /// Fetch values. Names that do not exist are left out of the result.
    async fn get_values(&self, region: &str, names: &[String]) -> BridgeResult<BTreeMap<String, String>>;

    /// Create or overwrite a value.
    async fn put_value(&self, region: &str, name: &str, value: &str) -> BridgeResult<()>;

    /// Delete values. Names that do not exist are ignored.
    async fn delete_values(&self, region: &str, names: &[String]) -> BridgeResult<()>;

    /// Add or overwrite tags on an existing value.
    async fn add_tags(&self, region: &str, name: &str, tags: &BTreeMap<String, String>) -> BridgeResult<()>;

    /// Remove tags. Missing names or tags are ignored.
    async fn remove_tags(&self, region: &str, name: &str, keys: &[String]) -> BridgeResult<()>;

    /// Tags of a value; empty when the value does not exist.
    async fn list_tags(&self, region: &str, name: &str) -> BridgeResult<BTreeMap<String, String>>;
}
