//! Resource lifecycle protocol.
//!
//! The deployment platform invokes a bridge with a lifecycle event and
//! expects exactly one response through its completion callback.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// Lifecycle phase of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

/// Event delivered by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleEvent {
    pub request_type: RequestType,
    pub request_id: String,
    pub stack_id: String,
    pub logical_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    pub resource_type: String,
    #[serde(default)]
    pub resource_properties: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_resource_properties: Option<serde_json::Value>,
    #[serde(rename = "ResponseURL", default, skip_serializing_if = "Option::is_none")]
    pub response_url: Option<String>,
}

impl LifecycleEvent {
    /// Name of the stack that owns the resource.
    ///
    /// Accepts full stack ARNs (`...:stack/<name>/<id>`) as well as bare names.
    pub fn stack_name(&self) -> BridgeResult<String> {
        let name = match self.stack_id.split_once(":stack/") {
            Some((_, rest)) => rest.split('/').next().unwrap_or_default(),
            None => self.stack_id.as_str(),
        };
        if name.is_empty() {
            return Err(BridgeError::InvalidEvent(format!(
                "cannot determine stack name from StackId '{}'",
                self.stack_id
            )));
        }
        Ok(name.to_string())
    }

    /// Deserialize the property stored under `key`.
    pub fn properties<T: DeserializeOwned>(&self, key: &str) -> BridgeResult<T> {
        let raw = self
            .resource_properties
            .get(key)
            .ok_or_else(|| BridgeError::InvalidEvent(format!("missing property {}", key)))?;
        Ok(serde_json::from_value(raw.clone())?)
    }

    /// Deserialize the previous property stored under `key`, on updates.
    pub fn old_properties<T: DeserializeOwned>(&self, key: &str) -> BridgeResult<Option<T>> {
        match self.old_resource_properties.as_ref().and_then(|p| p.get(key)) {
            Some(raw) => Ok(Some(serde_json::from_value(raw.clone())?)),
            None => Ok(None),
        }
    }
}

/// What a handler produced for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub physical_resource_id: String,
    pub data: BTreeMap<String, String>,
}

/// Final status reported to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

/// Response sent through the completion callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl LifecycleResponse {
    pub fn success(event: &LifecycleEvent, outcome: Outcome) -> Self {
        Self {
            status: ResponseStatus::Success,
            reason: None,
            physical_resource_id: outcome.physical_resource_id,
            stack_id: event.stack_id.clone(),
            request_id: event.request_id.clone(),
            logical_resource_id: event.logical_resource_id.clone(),
            data: outcome.data,
        }
    }

    pub fn failure(event: &LifecycleEvent, error: &BridgeError) -> Self {
        Self {
            status: ResponseStatus::Failed,
            reason: Some(error.to_string()),
            physical_resource_id: event
                .physical_resource_id
                .clone()
                .unwrap_or_else(|| event.logical_resource_id.clone()),
            stack_id: event.stack_id.clone(),
            request_id: event.request_id.clone(),
            logical_resource_id: event.logical_resource_id.clone(),
            data: BTreeMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// Completion callback of the platform.
#[async_trait]
pub trait CompletionSink: Send + Sync {
    /// Deliver the final response.
    async fn complete(&self, response: LifecycleResponse) -> BridgeResult<()>;
}

/// Sink that keeps every response, for local runs and tests.
#[derive(Clone, Default)]
pub struct CollectingSink {
    responses: Arc<RwLock<Vec<LifecycleResponse>>>,
    fail_with: Arc<RwLock<Option<String>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery fail.
    pub fn failing(self, message: impl Into<String>) -> Self {
        *self.fail_with.write() = Some(message.into());
        self
    }

    pub fn responses(&self) -> Vec<LifecycleResponse> {
        self.responses.read().clone()
    }

    pub fn count(&self) -> usize {
        self.responses.read().len()
    }
}

#[async_trait]
impl CompletionSink for CollectingSink {
    async fn complete(&self, response: LifecycleResponse) -> BridgeResult<()> {
        self.responses.write().push(response);
        match self.fail_with.read().clone() {
            Some(message) => Err(BridgeError::Completion(message)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(stack_id: &str) -> LifecycleEvent {
        serde_json::from_value(json!({
            "RequestType": "Create",
            "RequestId": "req-1",
            "StackId": stack_id,
            "LogicalResourceId": "ExportsReaderUsEast1",
            "ResourceType": "Custom::MityExportReader",
            "ResourceProperties": {
                "ServiceToken": "arn:aws:lambda:us-west-2:111111111111:function:reader",
                "ReaderProps": {
                    "region": "us-east-1",
                    "prefix": "mity/exports",
                    "imports": {"/mity/exports/A/X": "A.X"}
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_stack_name_from_arn() {
        let e = event("arn:aws:cloudformation:us-west-2:111111111111:stack/Consumer/0a1b2c");
        assert_eq!(e.stack_name().unwrap(), "Consumer");
    }

    #[test]
    fn test_stack_name_from_plain_name() {
        assert_eq!(event("Consumer").stack_name().unwrap(), "Consumer");
        assert!(event("").stack_name().is_err());
    }

    #[test]
    fn test_properties_lookup() {
        let e = event("Consumer");
        let props: crate::store::ReaderProps = e.properties("ReaderProps").unwrap();
        assert_eq!(props.prefix, "mity/exports");

        let missing: BridgeResult<crate::store::ReaderProps> = e.properties("WriterProps");
        assert!(matches!(missing, Err(BridgeError::InvalidEvent(_))));
        assert!(e
            .old_properties::<crate::store::ReaderProps>("ReaderProps")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_response_wire_format() {
        let e = event("Consumer");
        let response = LifecycleResponse::failure(&e, &BridgeError::Timeout(5));
        let wire = serde_json::to_value(&response).unwrap();

        assert_eq!(wire["Status"], "FAILED");
        assert_eq!(wire["PhysicalResourceId"], "ExportsReaderUsEast1");
        assert_eq!(wire["Reason"], "Bridge invocation timed out after 5 seconds");
    }
}
