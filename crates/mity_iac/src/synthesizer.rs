//! Bootstrap version gate added to every template.

use serde_json::{json, Value};

use crate::config::SynthesizerConfig;
use crate::template::Template;

pub const BOOTSTRAP_PARAMETER: &str = "BootstrapVersion";
pub const BOOTSTRAP_RULE: &str = "CheckBootstrapVersion";

/// Store path holding the deployed bootstrap version.
pub fn bootstrap_parameter_path(qualifier: &str) -> String {
    format!("/mity-bootstrap/{}/version", qualifier)
}

/// Add the bootstrap parameter and, when enabled, the rule rejecting older
/// bootstrap versions.
pub fn add_bootstrap(template: &mut Template, config: &SynthesizerConfig) {
    template.parameters.insert(
        BOOTSTRAP_PARAMETER.to_string(),
        json!({
            "Type": "AWS::SSM::Parameter::Value<String>",
            "Default": bootstrap_parameter_path(&config.qualifier),
            "Description": "Version of the bootstrap resources in this environment, read from the parameter store."
        }),
    );

    if !config.generate_bootstrap_rule || config.bootstrap_version <= 1 {
        return;
    }
    template
        .rules
        .insert(BOOTSTRAP_RULE.to_string(), version_rule(config.bootstrap_version));
}

fn version_rule(required: u32) -> Value {
    let outdated: Vec<String> = (1..required).map(|v| v.to_string()).collect();
    json!({
        "Assertions": [{
            "Assert": {
                "Fn::Not": [{
                    "Fn::Contains": [outdated, {"Ref": BOOTSTRAP_PARAMETER}]
                }]
            },
            "AssertDescription": format!(
                "This stack requires bootstrap version {} or later. Re-run bootstrap for this environment.",
                required
            )
        }]
    })
}
