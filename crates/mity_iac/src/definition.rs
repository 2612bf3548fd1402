//! Declarative app definitions.
//!
//! A YAML file lists stacks, their environments, resources and outputs.
//! Strings may refer to resources of any stack in the file:
//!
//! ```yaml
//! stacks:
//!   Network:
//!     env: { account: "111111111111", region: us-east-1 }
//!     resources:
//!       Vpc:
//!         type: AWS::EC2::VPC
//!         properties: { CidrBlock: 10.0.0.0/16 }
//!   Service:
//!     env: { account: "111111111111", region: us-west-2 }
//!     resources:
//!       Queue:
//!         type: AWS::SQS::Queue
//!         properties:
//!           QueueName: "svc-${Network.Vpc}"
//!           Tags: [{ Key: vpc-arn, Value: "${Network.Vpc.Arn}" }]
//! ```
//!
//! `${Stack.LogicalId}` is the resource's `Ref`, `${Stack.LogicalId.Attr}`
//! one of its attributes. Placeholders whose first segment is not a stack
//! of the file are kept as literal text, so `Fn::Sub` variables such as
//! `${Bucket.Arn}` pass through untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use mity_core::{Prop, TokenMap};

use crate::app::App;
use crate::config::AppConfig;
use crate::environment::Environment;
use crate::error::{IacError, IacResult};
use crate::stack::{OutputDef, Resource, Stack};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z][A-Za-z0-9-]*)\.([A-Za-z0-9]+)(?:\.([A-Za-z0-9.]+))?\}")
        .expect("valid regex")
});

fn default_true() -> bool {
    true
}

/// Root of an app definition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDefinition {
    #[serde(default)]
    pub config: AppConfig,
    pub stacks: BTreeMap<String, StackDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackDefinition {
    #[serde(default)]
    pub env: Environment,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub cross_region_references: bool,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceDefinition>,
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub properties: Value,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub deletion_policy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDefinition {
    pub value: Value,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub export_name: Option<String>,
}

impl AppDefinition {
    pub fn from_file(path: &Path) -> IacResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> IacResult<Self> {
        let definition: Self = serde_yaml::from_str(yaml)?;
        if definition.stacks.is_empty() {
            return Err(IacError::InvalidDefinition("no stacks defined".to_string()));
        }
        Ok(definition)
    }

    /// Build the app described by this definition.
    pub fn into_app(self) -> IacResult<App> {
        let names: BTreeSet<String> = self.stacks.keys().cloned().collect();
        let mut app = App::with_config(self.config);

        for (name, definition) in &self.stacks {
            let mut stack = Stack::new(name.as_str(), definition.env.clone())
                .with_cross_region_references(definition.cross_region_references);
            if let Some(description) = &definition.description {
                stack = stack.with_description(description.as_str());
            }
            for dependency in &definition.depends_on {
                stack.add_dependency(dependency.as_str());
            }
            app.add_stack(stack)?;
        }

        for (name, definition) in self.stacks {
            for (id, resource) in definition.resources {
                let properties = convert(&mut app, &names, resource.properties)?;
                let mut built = Resource::new(resource.resource_type).with_properties(properties);
                for dependency in resource.depends_on {
                    built = built.with_depends_on(dependency);
                }
                if let Some(policy) = resource.deletion_policy {
                    built = built.with_deletion_policy(policy);
                }
                app.stack_mut(&name)?.add_resource(id, built)?;
            }

            for (id, output) in definition.outputs {
                let mut built = OutputDef::new(convert(&mut app, &names, output.value)?);
                if let Some(description) = output.description {
                    built = built.with_description(description);
                }
                if let Some(export_name) = output.export_name {
                    built = built.with_export_name(export_name);
                }
                app.stack_mut(&name)?.add_output(id, built)?;
            }
        }
        Ok(app)
    }
}

/// Convert a parsed value, turning placeholders into reference tokens.
fn convert(app: &mut App, stacks: &BTreeSet<String>, value: Value) -> IacResult<Prop> {
    Ok(match value {
        Value::String(text) => convert_string(app, stacks, &text),
        Value::Array(items) => Prop::List(
            items
                .into_iter()
                .map(|item| convert(app, stacks, item))
                .collect::<IacResult<Vec<_>>>()?,
        ),
        Value::Object(entries) => {
            let mut map = BTreeMap::new();
            for (key, item) in entries {
                map.insert(TokenMap::escape(&key), convert(app, stacks, item)?);
            }
            Prop::Map(map)
        }
        other => Prop::from(other),
    })
}

fn convert_string(app: &mut App, stacks: &BTreeSet<String>, text: &str) -> Prop {
    let mut parts = Vec::new();
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(text) {
        let (Some(whole), Some(stack), Some(id)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        if !stacks.contains(stack.as_str()) {
            continue;
        }
        if whole.start() > last {
            parts.push(Prop::from(TokenMap::escape(&text[last..whole.start()])));
        }
        let token = match caps.get(3) {
            Some(attribute) => app.get_att(stack.as_str(), id.as_str(), attribute.as_str()),
            None => app.reference(stack.as_str(), id.as_str()),
        };
        debug!("{} -> {}", whole.as_str(), token.marker());
        parts.push(Prop::Token(token));
        last = whole.end();
    }

    if parts.is_empty() {
        return Prop::from(TokenMap::escape(text));
    }
    if last < text.len() {
        parts.push(Prop::from(TokenMap::escape(&text[last..])));
    }
    if parts.len() == 1 {
        return parts.remove(0);
    }
    Prop::Token(app.tokens_mut().concat("Text", parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const YAML: &str = r#"
stacks:
  Network:
    env: { account: "111111111111", region: us-east-1 }
    resources:
      Vpc:
        type: AWS::EC2::VPC
        properties:
          CidrBlock: 10.0.0.0/16
  Service:
    env: { account: "111111111111", region: us-east-1 }
    dependsOn: [Network]
    resources:
      Queue:
        type: AWS::SQS::Queue
        properties:
          QueueName: "svc-${Network.Vpc}-queue"
          VpcArn: "${Network.Vpc.Arn}"
          Policy: { "Fn::Sub": "${Bucket.Arn}/*" }
    outputs:
      QueueUrl:
        value: "${Service.Queue}"
        exportName: service-queue
"#;

    #[test]
    fn test_definition_builds_app() {
        let app = AppDefinition::from_yaml(YAML).unwrap().into_app().unwrap();
        let service = app.stack("Service").unwrap();
        assert_eq!(service.dependencies().len(), 1);
        assert_eq!(service.outputs()["QueueUrl"].export_name.as_deref(), Some("service-queue"));

        let properties = &service.resource("Queue").unwrap().properties;
        assert!(matches!(properties.get("VpcArn"), Some(Prop::Token(_))));
        assert_eq!(
            properties.get("Policy").and_then(|p| p.get("Fn::Sub")).and_then(Prop::as_str),
            Some("${Bucket.Arn}/*")
        );
    }

    #[test]
    fn test_definition_synthesizes_imports() {
        let app = AppDefinition::from_yaml(YAML).unwrap().into_app().unwrap();
        let assembly = app.synth().unwrap();
        let queue = &assembly.template("Service").unwrap().resources["Queue"]["Properties"];

        assert_eq!(
            queue["QueueName"],
            json!({"Fn::Join": ["", ["svc-", {"Fn::ImportValue": "Network:ExportsOutputVpc"}, "-queue"]]})
        );
        assert_eq!(
            queue["VpcArn"],
            json!({"Fn::ImportValue": "Network:ExportsOutputVpcArn"})
        );
        assert_eq!(
            assembly.template("Service").unwrap().outputs["QueueUrl"]["Value"],
            json!({"Ref": "Queue"})
        );
        assert_eq!(assembly.deploy_order(), ["Network".to_string(), "Service".to_string()]);
    }

    #[test]
    fn test_literal_marker_text_is_escaped() {
        let yaml = r#"
stacks:
  Solo:
    resources:
      Topic:
        type: AWS::SNS::Topic
        properties:
          DisplayName: "${Token[Fake.1]}"
"#;
        let app = AppDefinition::from_yaml(yaml).unwrap().into_app().unwrap();
        let assembly = app.synth().unwrap();
        assert_eq!(
            assembly.template("Solo").unwrap().resources["Topic"]["Properties"]["DisplayName"],
            json!("${Token[Fake.1]}")
        );
    }

    #[test]
    fn test_marker_shaped_map_key_stays_literal() {
        let yaml = r#"
stacks:
  Solo:
    resources:
      Topic:
        type: AWS::SNS::Topic
        properties:
          Tags:
            "${Token[Fake.7]}": kept
"#;
        let app = AppDefinition::from_yaml(yaml).unwrap().into_app().unwrap();
        let assembly = app.synth().unwrap();
        assert_eq!(
            assembly.template("Solo").unwrap().resources["Topic"]["Properties"]["Tags"],
            json!({"${Token[Fake.7]}": "kept"})
        );
    }

    #[test]
    fn test_empty_definition_is_rejected() {
        assert!(matches!(
            AppDefinition::from_yaml("stacks: {}\n"),
            Err(IacError::InvalidDefinition(_))
        ));
    }
}
