//! Integration tests for the export bridge runtime.
//!
//! These tests drive writer and reader handlers against a shared in-memory
//! store, the way a producing and a consuming stack deploy one after the
//! other.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use mity_bridge::{
    export_key, BridgeError, BridgeHandler, BridgeResult, CollectingSink, ExportStore,
    HandlerConfig, LifecycleEvent, MemoryStore, ResponseStatus, DEFAULT_PREFIX,
    READER_RESOURCE_TYPE, WRITER_RESOURCE_TYPE,
};

fn writer_event(request_type: &str, exports: serde_json::Value) -> LifecycleEvent {
    serde_json::from_value(json!({
        "RequestType": request_type,
        "RequestId": format!("writer-{}", request_type),
        "StackId": "arn:aws:cloudformation:us-east-1:111111111111:stack/Network/guid-a",
        "LogicalResourceId": "ExportsWriter",
        "ResourceType": WRITER_RESOURCE_TYPE,
        "ResourceProperties": {
            "WriterProps": {"region": "us-east-1", "prefix": DEFAULT_PREFIX, "exports": exports}
        }
    }))
    .unwrap()
}

fn reader_event(request_type: &str, imports: serde_json::Value) -> LifecycleEvent {
    serde_json::from_value(json!({
        "RequestType": request_type,
        "RequestId": format!("reader-{}", request_type),
        "StackId": "arn:aws:cloudformation:us-west-2:111111111111:stack/Service/guid-b",
        "LogicalResourceId": "ExportsReaderUsEast1",
        "PhysicalResourceId": "exports-reader-existing",
        "ResourceType": READER_RESOURCE_TYPE,
        "ResourceProperties": {
            "ReaderProps": {"region": "us-east-1", "prefix": DEFAULT_PREFIX, "imports": imports}
        }
    }))
    .unwrap()
}

fn handler(store: &MemoryStore) -> BridgeHandler {
    BridgeHandler::new(
        Arc::new(store.clone()),
        HandlerConfig::default().backoff_ms(0),
    )
}

/// Producer publishes, consumer reads, then lifecycle runs in reverse.
#[tokio::test]
async fn test_producer_then_consumer_lifecycle() {
    let store = MemoryStore::new();
    let sink = CollectingSink::new();
    let bridge = handler(&store);
    let vpc = export_key(DEFAULT_PREFIX, "Network", "VpcId");

    let written = bridge
        .handle(&writer_event("Create", json!({&vpc: "vpc-123"})), &sink)
        .await
        .unwrap();
    assert!(written.response.is_success());

    let read = bridge
        .handle(&reader_event("Create", json!({&vpc: "Network.VpcId"})), &sink)
        .await
        .unwrap();
    assert!(read.response.is_success());
    assert_eq!(read.response.data.get(&vpc).map(String::as_str), Some("vpc-123"));

    // Producer cannot drop the export while the consumer still holds it.
    let blocked = bridge
        .handle(&writer_event("Delete", json!({&vpc: "vpc-123"})), &sink)
        .await
        .unwrap();
    assert_eq!(blocked.response.status, ResponseStatus::Failed);
    assert!(blocked.response.reason.unwrap().contains("Service"));

    bridge
        .handle(&reader_event("Delete", json!({&vpc: "Network.VpcId"})), &sink)
        .await
        .unwrap();
    let deleted = bridge
        .handle(&writer_event("Delete", json!({&vpc: "vpc-123"})), &sink)
        .await
        .unwrap();
    assert!(deleted.response.is_success());
    assert!(store.value("us-east-1", &vpc).is_none());

    assert_eq!(sink.count(), 5);
}

/// Reader deployed before its producer fails with the missing key.
#[tokio::test]
async fn test_reader_before_writer_fails() {
    let store = MemoryStore::new();
    let sink = CollectingSink::new();
    let vpc = export_key(DEFAULT_PREFIX, "Network", "VpcId");

    let report = handler(&store)
        .handle(&reader_event("Create", json!({&vpc: "Network.VpcId"})), &sink)
        .await
        .unwrap();

    let response = &sink.responses()[0];
    assert_eq!(response.status, ResponseStatus::Failed);
    assert_eq!(response.physical_resource_id, "exports-reader-existing");
    assert!(response.reason.as_deref().unwrap_or_default().contains(&vpc));
    assert_eq!(report.response, *response);
}

/// Throttling is retried without producing extra completions.
#[tokio::test]
async fn test_throttled_writer_recovers() {
    let store = MemoryStore::new().fail_next(1);
    let sink = CollectingSink::new();
    let key = export_key(DEFAULT_PREFIX, "Network", "SubnetId");

    let report = handler(&store)
        .handle(&writer_event("Create", json!({&key: "subnet-1"})), &sink)
        .await
        .unwrap();

    assert!(report.response.is_success());
    assert_eq!(report.attempts, 2);
    assert_eq!(sink.count(), 1);
    assert_eq!(store.value("us-east-1", &key).as_deref(), Some("subnet-1"));
}

/// Permanent store failures are not retried.
#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let store = MemoryStore::new().simulate_failure("access denied");
    let sink = CollectingSink::new();
    let key = export_key(DEFAULT_PREFIX, "Network", "SubnetId");

    let report = handler(&store)
        .handle(&writer_event("Create", json!({&key: "subnet-1"})), &sink)
        .await
        .unwrap();

    assert_eq!(report.response.status, ResponseStatus::Failed);
    assert_eq!(report.attempts, 1);
    assert_eq!(store.call_count(), 1);
}

/// Store that never answers.
struct StalledStore;

#[async_trait]
impl ExportStore for StalledStore {
    async fn get_values(
        &self,
        _region: &str,
        _names: &[String],
    ) -> BridgeResult<std::collections::BTreeMap<String, String>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Default::default())
    }

    async fn put_value(&self, _region: &str, _name: &str, _value: &str) -> BridgeResult<()> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }

    async fn delete_values(&self, _region: &str, _names: &[String]) -> BridgeResult<()> {
        Ok(())
    }

    async fn add_tags(
        &self,
        _region: &str,
        _name: &str,
        _tags: &std::collections::BTreeMap<String, String>,
    ) -> BridgeResult<()> {
        Ok(())
    }

    async fn remove_tags(&self, _region: &str, _name: &str, _keys: &[String]) -> BridgeResult<()> {
        Ok(())
    }

    async fn list_tags(
        &self,
        _region: &str,
        _name: &str,
    ) -> BridgeResult<std::collections::BTreeMap<String, String>> {
        Ok(Default::default())
    }
}

/// A stalled store still yields exactly one failed completion.
#[tokio::test]
async fn test_timeout_reports_failure_once() {
    let sink = CollectingSink::new();
    let bridge = BridgeHandler::new(Arc::new(StalledStore), HandlerConfig::default().timeout_secs(1));
    let key = export_key(DEFAULT_PREFIX, "Network", "VpcId");

    let report = bridge
        .handle(&reader_event("Create", json!({&key: "Network.VpcId"})), &sink)
        .await
        .unwrap();

    assert_eq!(sink.count(), 1);
    assert_eq!(report.attempts, 1);
    assert_eq!(report.response.status, ResponseStatus::Failed);
    assert_eq!(
        report.response.reason.as_deref(),
        Some(BridgeError::Timeout(1).to_string().as_str())
    );
}
