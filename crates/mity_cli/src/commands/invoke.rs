//! Invoke command - Run the export bridge handler locally.
//!
//! The store is a JSON snapshot on disk, so a sequence of invocations can
//! replay a producer and consumer lifecycle without any cloud account.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;
use tracing::info;

use mity_bridge::{BridgeHandler, CollectingSink, HandlerConfig, LifecycleEvent, MemoryStore};

#[derive(Args)]
pub struct InvokeArgs {
    /// Lifecycle event file (JSON)
    #[arg(short, long)]
    pub event: PathBuf,

    /// Store snapshot read before and written after the invocation
    #[arg(short, long, default_value = "mity-store.json", env = "MITY_STORE")]
    pub store: PathBuf,

    /// Budget for the invocation in seconds
    #[arg(long, default_value_t = 270)]
    pub timeout_secs: u64,

    /// Attempts for retryable store failures
    #[arg(long, default_value_t = 3)]
    pub max_attempts: u32,

    /// Exit with an error when the handler reports FAILED
    #[arg(long)]
    pub strict: bool,
}

pub async fn execute(args: InvokeArgs) -> Result<()> {
    let raw = std::fs::read_to_string(&args.event)
        .with_context(|| format!("Event file not found: {}", args.event.display()))?;
    let event: LifecycleEvent = serde_json::from_str(&raw)?;

    let store = MemoryStore::load(&args.store)?;
    let config = HandlerConfig::default()
        .timeout_secs(args.timeout_secs)
        .max_attempts(args.max_attempts);
    let handler = BridgeHandler::new(Arc::new(store.clone()), config);
    let sink = CollectingSink::new();

    info!(
        "Invoking {} for {} ({:?})",
        event.resource_type, event.logical_resource_id, event.request_type
    );
    let report = handler.handle(&event, &sink).await?;
    store.save(&args.store)?;

    let output = json!({
        "response": report.response,
        "attempts": report.attempts,
        "startedAt": report.started_at.to_rfc3339(),
        "durationMs": report.duration_ms(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    if args.strict && !report.response.is_success() {
        anyhow::bail!(
            "Bridge handler failed: {}",
            report.response.reason.as_deref().unwrap_or("no reason given")
        );
    }
    Ok(())
}
