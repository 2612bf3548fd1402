//! # mity_bridge
//!
//! Deploy-time runtime behind cross-region references in mITyFactory.
//!
//! When a stack consumes a value produced by a stack in another region, the
//! synthesizer wires two custom resources: a writer in the producing stack
//! that publishes exports to a regional key-value store, and a reader in the
//! consuming stack that fetches them during deployment. This crate is the
//! handler code those resources invoke.
//!
//! # Features
//!
//! - **Reader**: fetches exports, fails on missing keys, records consumer holds
//! - **Writer**: publishes exports, refuses to change or drop held exports
//! - **Handler**: dispatch, bounded retries, timeout and exactly-once completion
//! - **Memory Store**: in-process store with call capture and failure injection
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mity_bridge::{BridgeHandler, CollectingSink, HandlerConfig, LifecycleEvent, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryStore::new().with_value("us-east-1", "/mity/exports/A/X", "v");
//!     let handler = BridgeHandler::new(Arc::new(store), HandlerConfig::default());
//!
//!     let event: LifecycleEvent = serde_json::from_str(&std::fs::read_to_string("event.json")?)?;
//!     let sink = CollectingSink::new();
//!     let report = handler.handle(&event, &sink).await?;
//!     println!("{:?}", report.response.status);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod memory;
pub mod reader;
pub mod store;
pub mod writer;

pub use config::HandlerConfig;
pub use error::{BridgeError, BridgeResult};
pub use event::{
    CollectingSink, CompletionSink, LifecycleEvent, LifecycleResponse, Outcome, RequestType,
    ResponseStatus,
};
pub use handler::{BridgeHandler, HandlerReport};
pub use memory::{CapturedCall, MemoryStore, StoreSnapshot, StoredValue};
pub use reader::ExportReader;
pub use store::{
    export_key, producer_namespace, producer_of, reader_identity, ExportStore, ReaderProps,
    WriterProps, DEFAULT_PREFIX, READER_ACTIONS, READER_PROPS_KEY, READER_RESOURCE_TYPE,
    STRONG_REF_TAG_PREFIX, WRITER_ACTIONS, WRITER_PROPS_KEY, WRITER_RESOURCE_TYPE,
};
pub use writer::ExportWriter;
