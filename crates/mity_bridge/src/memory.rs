//! In-memory export store.
//!
//! Backs local invocations and tests. Captures every call and can simulate
//! transient or permanent failures, so handlers can be exercised without a
//! real parameter store.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};
use crate::store::ExportStore;

/// A stored value and its tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredValue {
    pub value: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Serializable contents of a [`MemoryStore`]: region to name to value.
pub type StoreSnapshot = BTreeMap<String, BTreeMap<String, StoredValue>>;

/// Captured call information for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedCall {
    pub method: String,
    pub region: String,
    pub names: Vec<String>,
}

/// In-memory [`ExportStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    /// Values keyed by region and name.
    values: Arc<RwLock<StoreSnapshot>>,
    /// Captured calls for verification.
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    /// Number of upcoming calls that fail with a retryable error.
    transient_failures: Arc<AtomicUsize>,
    /// Permanent failure to return from every call.
    simulate_failure: Arc<RwLock<Option<String>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let store = Self::new();
        *store.values.write() = snapshot;
        store
    }

    /// Seed a value.
    pub fn with_value(self, region: &str, name: &str, value: &str) -> Self {
        self.values
            .write()
            .entry(region.to_string())
            .or_default()
            .insert(
                name.to_string(),
                StoredValue {
                    value: value.to_string(),
                    tags: BTreeMap::new(),
                },
            );
        self
    }

    /// Seed a tag on an existing value.
    pub fn with_tag(self, region: &str, name: &str, tag: &str, value: &str) -> Self {
        if let Some(stored) = self
            .values
            .write()
            .get_mut(region)
            .and_then(|r| r.get_mut(name))
        {
            stored.tags.insert(tag.to_string(), value.to_string());
        }
        self
    }

    /// Fail the next `count` calls with a retryable error.
    pub fn fail_next(self, count: usize) -> Self {
        self.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Fail every call with a permanent error.
    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        *self.simulate_failure.write() = Some(message.into());
        self
    }

    /// Load a store persisted with [`MemoryStore::save`].
    ///
    /// A missing file yields an empty store.
    pub fn load(path: &Path) -> BridgeResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::from_snapshot(serde_json::from_str(&raw)?))
    }

    /// Persist the current contents as JSON.
    pub fn save(&self, path: &Path) -> BridgeResult<()> {
        let raw = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Current contents.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.values.read().clone()
    }

    /// Current value of a name.
    pub fn value(&self, region: &str, name: &str) -> Option<String> {
        self.values
            .read()
            .get(region)
            .and_then(|r| r.get(name))
            .map(|s| s.value.clone())
    }

    /// Current tags of a name.
    pub fn tags(&self, region: &str, name: &str) -> BTreeMap<String, String> {
        self.values
            .read()
            .get(region)
            .and_then(|r| r.get(name))
            .map(|s| s.tags.clone())
            .unwrap_or_default()
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Check if a specific method was called.
    pub fn was_called(&self, method: &str) -> bool {
        self.captured_calls.read().iter().any(|c| c.method == method)
    }

    /// Clear all captured calls.
    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    fn record_call(&self, method: &str, region: &str, names: Vec<String>) -> BridgeResult<()> {
        self.captured_calls.write().push(CapturedCall {
            method: method.to_string(),
            region: region.to_string(),
            names,
        });

        if let Some(msg) = self.simulate_failure.read().clone() {
            return Err(BridgeError::permanent(msg));
        }

        let consumed = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(BridgeError::transient(format!("{} throttled", method)));
        }
        Ok(())
    }
}

#[async_trait]
impl ExportStore for MemoryStore {
    async fn get_values(&self, region: &str, names: &[String]) -> BridgeResult<BTreeMap<String, String>> {
        self.record_call("get_values", region, names.to_vec())?;
        let values = self.values.read();
        let Some(regional) = values.get(region) else {
            return Ok(BTreeMap::new());
        };
        Ok(names
            .iter()
            .filter_map(|name| regional.get(name).map(|s| (name.clone(), s.value.clone())))
            .collect())
    }

    async fn put_value(&self, region: &str, name: &str, value: &str) -> BridgeResult<()> {
        self.record_call("put_value", region, vec![name.to_string()])?;
        let mut values = self.values.write();
        let stored = values
            .entry(region.to_string())
            .or_default()
            .entry(name.to_string())
            .or_default();
        stored.value = value.to_string();
        Ok(())
    }

    async fn delete_values(&self, region: &str, names: &[String]) -> BridgeResult<()> {
        self.record_call("delete_values", region, names.to_vec())?;
        if let Some(regional) = self.values.write().get_mut(region) {
            for name in names {
                regional.remove(name);
            }
        }
        Ok(())
    }

    async fn add_tags(&self, region: &str, name: &str, tags: &BTreeMap<String, String>) -> BridgeResult<()> {
        self.record_call("add_tags", region, vec![name.to_string()])?;
        let mut values = self.values.write();
        let stored = values
            .get_mut(region)
            .and_then(|r| r.get_mut(name))
            .ok_or_else(|| BridgeError::permanent(format!("parameter {} not found", name)))?;
        stored.tags.extend(tags.clone());
        Ok(())
    }

    async fn remove_tags(&self, region: &str, name: &str, keys: &[String]) -> BridgeResult<()> {
        self.record_call("remove_tags", region, vec![name.to_string()])?;
        if let Some(stored) = self.values.write().get_mut(region).and_then(|r| r.get_mut(name)) {
            for key in keys {
                stored.tags.remove(key);
            }
        }
        Ok(())
    }

    async fn list_tags(&self, region: &str, name: &str) -> BridgeResult<BTreeMap<String, String>> {
        self.record_call("list_tags", region, vec![name.to_string()])?;
        Ok(self.tags(region, name))
    }
}
