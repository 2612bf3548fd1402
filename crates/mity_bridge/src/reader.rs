//! Export reader: fetches exports from the producing region during the
//! consuming stack's deployment.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::HandlerConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::event::{LifecycleEvent, Outcome, RequestType};
use crate::store::{reader_identity, ExportStore, ReaderProps, READER_PROPS_KEY};

/// Lifecycle handler of a reader resource.
pub struct ExportReader {
    store: Arc<dyn ExportStore>,
    config: HandlerConfig,
}

impl ExportReader {
    pub fn new(store: Arc<dyn ExportStore>, config: HandlerConfig) -> Self {
        Self { store, config }
    }

    /// Handle one lifecycle event.
    pub async fn on_event(&self, event: &LifecycleEvent) -> BridgeResult<Outcome> {
        let consumer = event.stack_name()?;
        match event.request_type {
            RequestType::Create | RequestType::Update => self.read(event, &consumer).await,
            RequestType::Delete => self.release(event, &consumer).await,
        }
    }

    async fn read(&self, event: &LifecycleEvent, consumer: &str) -> BridgeResult<Outcome> {
        let props: ReaderProps = event.properties(READER_PROPS_KEY)?;
        check_prefix(&props)?;

        let keys: Vec<String> = props.imports.keys().cloned().collect();
        info!(
            "Reading {} export(s) for {} from {}",
            keys.len(),
            consumer,
            props.region
        );

        let values = self.store.get_values(&props.region, &keys).await?;
        let missing: Vec<String> = keys
            .iter()
            .filter(|key| !values.contains_key(*key))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(BridgeError::MissingKeys { keys: missing });
        }

        let tag = BTreeMap::from([(self.config.strong_ref_tag(consumer), "true".to_string())]);
        for key in &keys {
            self.store.add_tags(&props.region, key, &tag).await?;
        }

        if event.request_type == RequestType::Update {
            if let Some(old) = event.old_properties::<ReaderProps>(READER_PROPS_KEY)? {
                self.untag_dropped(&old, &props, consumer).await?;
            }
        }

        Ok(Outcome {
            physical_resource_id: reader_identity(&keys),
            data: values,
        })
    }

    async fn untag_dropped(&self, old: &ReaderProps, new: &ReaderProps, consumer: &str) -> BridgeResult<()> {
        let tag = vec![self.config.strong_ref_tag(consumer)];
        for key in old.imports.keys() {
            let still_read = old.region == new.region && new.imports.contains_key(key);
            if !still_read {
                debug!("Releasing {} for {}", key, consumer);
                self.store.remove_tags(&old.region, key, &tag).await?;
            }
        }
        Ok(())
    }

    /// Delete never touches values, it only drops this consumer's holds.
    async fn release(&self, event: &LifecycleEvent, consumer: &str) -> BridgeResult<Outcome> {
        let props = event.properties::<ReaderProps>(READER_PROPS_KEY).ok();
        let keys: BTreeSet<String> = props
            .as_ref()
            .map(|p| p.imports.keys().cloned().collect())
            .unwrap_or_default();

        if let Some(props) = &props {
            let tag = vec![self.config.strong_ref_tag(consumer)];
            for key in &keys {
                self.store.remove_tags(&props.region, key, &tag).await?;
            }
        }

        Ok(Outcome {
            physical_resource_id: event
                .physical_resource_id
                .clone()
                .unwrap_or_else(|| reader_identity(&keys)),
            data: BTreeMap::new(),
        })
    }
}

fn check_prefix(props: &ReaderProps) -> BridgeResult<()> {
    let root = format!("/{}/", props.prefix.trim_matches('/'));
    match props.imports.keys().find(|key| !key.starts_with(&root)) {
        Some(key) => Err(BridgeError::KeyOutsideNamespace {
            key: key.clone(),
            namespace: root,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use serde_json::json;

    const X: &str = "/mity/exports/Producer/X";
    const Y: &str = "/mity/exports/Producer/Y";

    fn event(request_type: &str, imports: serde_json::Value, old: Option<serde_json::Value>) -> LifecycleEvent {
        let mut raw = json!({
            "RequestType": request_type,
            "RequestId": "req",
            "StackId": "arn:aws:cloudformation:us-west-2:111111111111:stack/Consumer/guid",
            "LogicalResourceId": "ExportsReaderUsEast1",
            "PhysicalResourceId": "exports-reader-previous",
            "ResourceType": "Custom::MityExportReader",
            "ResourceProperties": {
                "ReaderProps": {"region": "us-east-1", "prefix": "mity/exports", "imports": imports}
            }
        });
        if let Some(old) = old {
            raw["OldResourceProperties"] =
                json!({"ReaderProps": {"region": "us-east-1", "prefix": "mity/exports", "imports": old}});
        }
        serde_json::from_value(raw).unwrap()
    }

    fn reader(store: &MemoryStore) -> ExportReader {
        ExportReader::new(Arc::new(store.clone()), HandlerConfig::default())
    }

    #[tokio::test]
    async fn test_create_returns_values_as_attributes() {
        let store = MemoryStore::new()
            .with_value("us-east-1", X, "vx")
            .with_value("us-east-1", Y, "vy");

        let outcome = reader(&store)
            .on_event(&event("Create", json!({X: "Producer.X", Y: "Producer.Y"}), None))
            .await
            .unwrap();

        assert_eq!(outcome.data.get(X).map(String::as_str), Some("vx"));
        assert_eq!(outcome.data.get(Y).map(String::as_str), Some("vy"));
        assert_eq!(
            outcome.physical_resource_id,
            reader_identity(&[X.to_string(), Y.to_string()])
        );
        assert!(store.tags("us-east-1", X).contains_key("mity:strong-ref:Consumer"));
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_tagging() {
        let store = MemoryStore::new().with_value("us-east-1", X, "vx");

        let err = reader(&store)
            .on_event(&event("Create", json!({X: "Producer.X", Y: "Producer.Y"}), None))
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::MissingKeys { ref keys } if keys == &vec![Y.to_string()]));
        assert!(store.tags("us-east-1", X).is_empty());
    }

    #[tokio::test]
    async fn test_repeated_create_is_idempotent() {
        let store = MemoryStore::new().with_value("us-east-1", X, "vx");
        let handler = reader(&store);
        let e = event("Create", json!({X: "Producer.X"}), None);

        let first = handler.on_event(&e).await.unwrap();
        let second = handler.on_event(&e).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.value("us-east-1", X).as_deref(), Some("vx"));
    }

    #[tokio::test]
    async fn test_update_releases_dropped_keys() {
        let store = MemoryStore::new()
            .with_value("us-east-1", X, "vx")
            .with_value("us-east-1", Y, "vy")
            .with_tag("us-east-1", Y, "mity:strong-ref:Consumer", "true");

        let outcome = reader(&store)
            .on_event(&event("Update", json!({X: "Producer.X"}), Some(json!({X: "Producer.X", Y: "Producer.Y"}))))
            .await
            .unwrap();

        assert_eq!(outcome.data.len(), 1);
        assert!(store.tags("us-east-1", Y).is_empty());
        assert!(!store.tags("us-east-1", X).is_empty());
    }

    #[tokio::test]
    async fn test_delete_leaves_values_alone() {
        let store = MemoryStore::new()
            .with_value("us-east-1", X, "vx")
            .with_tag("us-east-1", X, "mity:strong-ref:Consumer", "true");

        let outcome = reader(&store)
            .on_event(&event("Delete", json!({X: "Producer.X"}), None))
            .await
            .unwrap();

        assert_eq!(outcome.physical_resource_id, "exports-reader-previous");
        assert_eq!(store.value("us-east-1", X).as_deref(), Some("vx"));
        assert!(store.tags("us-east-1", X).is_empty());
        assert!(!store.was_called("get_values"));
        assert!(!store.was_called("delete_values"));
    }

    #[tokio::test]
    async fn test_key_outside_prefix_is_rejected() {
        let store = MemoryStore::new();
        let err = reader(&store)
            .on_event(&event("Create", json!({"/elsewhere/Producer/X": "Producer.X"}), None))
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::KeyOutsideNamespace { .. }));
        assert_eq!(store.call_count(), 0);
    }
}
