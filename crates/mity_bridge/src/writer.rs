//! Export writer: publishes a producing stack's exports to the store.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::HandlerConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::event::{LifecycleEvent, Outcome, RequestType};
use crate::store::{producer_namespace, ExportStore, WriterProps, WRITER_PROPS_KEY};

/// Lifecycle handler of a writer resource.
pub struct ExportWriter {
    store: Arc<dyn ExportStore>,
    config: HandlerConfig,
}

impl ExportWriter {
    pub fn new(store: Arc<dyn ExportStore>, config: HandlerConfig) -> Self {
        Self { store, config }
    }

    /// Handle one lifecycle event.
    pub async fn on_event(&self, event: &LifecycleEvent) -> BridgeResult<Outcome> {
        let producer = event.stack_name()?;
        let props: WriterProps = event.properties(WRITER_PROPS_KEY)?;
        check_namespace(&props, &producer)?;

        match event.request_type {
            RequestType::Create => self.publish(&props, &props.exports).await?,
            RequestType::Update => {
                let old = event.old_properties::<WriterProps>(WRITER_PROPS_KEY)?;
                self.update(old.as_ref(), &props).await?;
            }
            RequestType::Delete => {
                let keys: Vec<String> = props.exports.keys().cloned().collect();
                self.ensure_unused(&props.region, &keys).await?;
                self.store.delete_values(&props.region, &keys).await?;
                info!("Deleted {} export(s) of {}", keys.len(), producer);
            }
        }

        Ok(Outcome {
            physical_resource_id: format!("exports-writer-{}", producer.to_lowercase()),
            data: BTreeMap::new(),
        })
    }

    async fn publish(&self, props: &WriterProps, exports: &BTreeMap<String, String>) -> BridgeResult<()> {
        for (key, value) in exports {
            self.store.put_value(&props.region, key, value).await?;
        }
        info!("Published {} export(s) in {}", exports.len(), props.region);
        Ok(())
    }

    async fn update(&self, old: Option<&WriterProps>, new: &WriterProps) -> BridgeResult<()> {
        let Some(old) = old else {
            return self.publish(new, &new.exports).await;
        };

        let moved = old.region != new.region;
        let mut removed = Vec::new();
        let mut changed = Vec::new();
        for (key, value) in &old.exports {
            match new.exports.get(key) {
                Some(next) if !moved && next == value => {}
                Some(_) if !moved => changed.push(key.clone()),
                _ => removed.push(key.clone()),
            }
        }

        self.ensure_unused(&old.region, &removed).await?;
        self.ensure_unused(&old.region, &changed).await?;

        let pending: BTreeMap<String, String> = new
            .exports
            .iter()
            .filter(|(key, value)| moved || old.exports.get(*key) != Some(*value))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.publish(new, &pending).await?;

        if !removed.is_empty() {
            warn!("Removing {} export(s) no longer published", removed.len());
            self.store.delete_values(&old.region, &removed).await?;
        }
        Ok(())
    }

    /// Fail when any key still carries a consumer hold.
    async fn ensure_unused(&self, region: &str, keys: &[String]) -> BridgeResult<()> {
        for key in keys {
            let tags = self.store.list_tags(region, key).await?;
            let consumers: Vec<String> = tags
                .keys()
                .filter_map(|tag| tag.strip_prefix(&self.config.strong_ref_tag_prefix))
                .map(str::to_string)
                .collect();
            if !consumers.is_empty() {
                return Err(BridgeError::ExportInUse {
                    key: key.clone(),
                    consumers,
                });
            }
        }
        Ok(())
    }
}

fn check_namespace(props: &WriterProps, producer: &str) -> BridgeResult<()> {
    let namespace = producer_namespace(&props.prefix, producer);
    match props.exports.keys().find(|key| !key.starts_with(&namespace)) {
        Some(key) => Err(BridgeError::KeyOutsideNamespace {
            key: key.clone(),
            namespace,
        }),
        None => Ok(()),
    }
}
