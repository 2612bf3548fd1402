//! Handler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::STRONG_REF_TAG_PREFIX;

/// Runtime settings for bridge handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Budget for one invocation, retries included.
    pub timeout_secs: u64,
    /// Attempts for retryable store failures.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub backoff_ms: u64,
    /// Tag name prefix marking a consumer's hold on an export.
    pub strong_ref_tag_prefix: String,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 270,
            max_attempts: 3,
            backoff_ms: 500,
            strong_ref_tag_prefix: STRONG_REF_TAG_PREFIX.to_string(),
        }
    }
}

impl HandlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn backoff_ms(mut self, ms: u64) -> Self {
        self.backoff_ms = ms;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Tag name recording that `consumer` imports a key.
    pub fn strong_ref_tag(&self, consumer: &str) -> String {
        format!("{}{}", self.strong_ref_tag_prefix, consumer)
    }
}
