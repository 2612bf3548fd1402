//! App-level configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use mity_bridge::DEFAULT_PREFIX;

use crate::error::{IacResult, ValidationError};

/// Settings shared by every stack of an app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    /// Store prefix under which cross-region exports are published.
    pub exports_prefix: String,
    pub synthesizer: SynthesizerConfig,
    pub bridge: BridgeFunctionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exports_prefix: DEFAULT_PREFIX.to_string(),
            synthesizer: SynthesizerConfig::default(),
            bridge: BridgeFunctionConfig::default(),
        }
    }
}

/// Bootstrap checks emitted into every template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SynthesizerConfig {
    pub qualifier: String,
    /// Minimum bootstrap version the templates require.
    pub bootstrap_version: u32,
    pub generate_bootstrap_rule: bool,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            qualifier: "mity0001".to_string(),
            bootstrap_version: 6,
            generate_bootstrap_rule: true,
        }
    }
}

/// Function backing generated export readers and writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeFunctionConfig {
    pub runtime: String,
    pub handler: String,
    pub timeout_seconds: u32,
    pub memory_size: u32,
    /// Code bucket; `${AWS::...}` placeholders are substituted at deploy time.
    pub code_bucket: String,
    pub code_key: String,
}

impl Default for BridgeFunctionConfig {
    fn default() -> Self {
        Self {
            runtime: "provided.al2023".to_string(),
            handler: "bootstrap".to_string(),
            timeout_seconds: 300,
            memory_size: 128,
            code_bucket: "mity-assets-${AWS::AccountId}-${AWS::Region}".to_string(),
            code_key: "bridge/export-bridge.zip".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> IacResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> IacResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn with_exports_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.exports_prefix = prefix.into();
        self
    }

    pub fn with_bootstrap_rule(mut self, enabled: bool) -> Self {
        self.synthesizer.generate_bootstrap_rule = enabled;
        self
    }

    /// Range checks; out-of-range values are never clamped silently.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let prefix = self.exports_prefix.trim_matches('/');
        if prefix.is_empty() || prefix.contains("//") {
            errors.push(ValidationError::new(
                "config/exportsPrefix",
                format!("invalid exports prefix '{}'", self.exports_prefix),
            ));
        }
        if !(1..=900).contains(&self.bridge.timeout_seconds) {
            errors.push(ValidationError::new(
                "config/bridge/timeoutSeconds",
                format!("{} is outside 1..=900", self.bridge.timeout_seconds),
            ));
        }
        if !(128..=10240).contains(&self.bridge.memory_size) {
            errors.push(ValidationError::new(
                "config/bridge/memorySize",
                format!("{} is outside 128..=10240", self.bridge.memory_size),
            ));
        }
        if self.synthesizer.qualifier.is_empty()
            || !self.synthesizer.qualifier.chars().all(|c| c.is_ascii_alphanumeric())
        {
            errors.push(ValidationError::new(
                "config/synthesizer/qualifier",
                "qualifier must be non-empty and alphanumeric",
            ));
        }
        errors
    }
}
