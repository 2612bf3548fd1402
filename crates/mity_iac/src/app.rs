//! The app: every stack plus the token map they share.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::{debug, info, warn};

use mity_core::{discover, intrinsics, Prop, Reference, ResolveContext, Resolver, Token, TokenMap};

use crate::assembly::{
    template_file, Artifact, ArtifactProperties, CloudAssembly, Manifest, MANIFEST_VERSION,
    STACK_ARTIFACT,
};
use crate::config::AppConfig;
use crate::error::{IacError, IacResult, ValidationError};
use crate::graph::DependencyGraph;
use crate::stack::{Stack, Validate};
use crate::synthesizer::add_bootstrap;
use crate::template::Template;

/// Root of a construct tree.
///
/// Owns the token map explicitly; nothing is looked up from ambient state.
#[derive(Debug, Default)]
pub struct App {
    config: AppConfig,
    tokens: TokenMap,
    stacks: BTreeMap<String, Stack>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Add a stack; names are unique per app.
    pub fn add_stack(&mut self, stack: Stack) -> IacResult<&mut Stack> {
        let name = stack.name().to_string();
        if self.stacks.contains_key(&name) {
            return Err(IacError::DuplicateStack(name));
        }
        info!("Registering stack {} ({})", name, stack.env());
        Ok(self.stacks.entry(name).or_insert(stack))
    }

    pub fn stack(&self, name: &str) -> Option<&Stack> {
        self.stacks.get(name)
    }

    pub fn stack_mut(&mut self, name: &str) -> IacResult<&mut Stack> {
        self.stacks
            .get_mut(name)
            .ok_or_else(|| IacError::UnknownStack(name.to_string()))
    }

    pub fn stacks(&self) -> impl Iterator<Item = &Stack> {
        self.stacks.values()
    }

    pub fn tokens(&self) -> &TokenMap {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut TokenMap {
        &mut self.tokens
    }

    /// Value `producer` exposes as `logical_name`, read through `target`.
    pub fn export_value(&mut self, producer: &str, logical_name: &str, target: Prop) -> Token {
        self.tokens
            .reference(Reference::new(producer, logical_name, target))
    }

    /// `Ref` of a resource, usable from any stack.
    pub fn reference(&mut self, producer: &str, logical_id: &str) -> Token {
        self.export_value(producer, logical_id, intrinsics::reference(logical_id))
    }

    /// Attribute of a resource, usable from any stack.
    pub fn get_att(&mut self, producer: &str, logical_id: &str, attribute: &str) -> Token {
        let suffix: String = attribute.chars().filter(char::is_ascii_alphanumeric).collect();
        self.export_value(
            producer,
            &format!("{}{}", logical_id, suffix),
            intrinsics::get_att(logical_id, attribute),
        )
    }

    /// Collect every validation error in the app.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = self.config.validate();
        let mut export_names: BTreeMap<&str, String> = BTreeMap::new();

        for (name, stack) in &self.stacks {
            errors.extend(stack.validate(name));

            for dependency in stack.dependencies() {
                if !self.stacks.contains_key(dependency) {
                    errors.push(ValidationError::new(
                        name.as_str(),
                        format!("depends on unknown stack '{}'", dependency),
                    ));
                }
            }

            for (id, output) in stack.outputs() {
                let Some(export) = output.export_name.as_deref() else {
                    continue;
                };
                let path = format!("{}/{}", name, id);
                if let Some(first) = export_names.get(export) {
                    errors.push(ValidationError::new(
                        &path,
                        format!("export name '{}' is already used by {}", export, first),
                    ));
                } else {
                    export_names.insert(export, path);
                }
            }
        }
        errors
    }

    /// Build the dependency graph and rewrite every cross-stack reference.
    pub fn graph(&self) -> IacResult<DependencyGraph> {
        let mut graph = DependencyGraph::new(self.config.exports_prefix.trim_matches('/'));
        for stack in self.stacks.values() {
            graph.add_stack(stack.name(), stack.env().clone(), stack.cross_region_references())?;
        }
        for stack in self.stacks.values() {
            for dependency in stack.dependencies() {
                graph.add_dependency(stack.name(), dependency)?;
            }
        }

        for stack in self.stacks.values() {
            let found = {
                let ctx = ResolveContext::new(stack.name(), &self.tokens, graph.references());
                discover(&stack.body(), ctx)?
            };
            for token in &found {
                let kind = graph.register_token(stack.name(), token)?;
                debug!("{} in {} registered as {:?}", token.marker(), stack.name(), kind);
            }
        }
        Ok(graph)
    }

    /// Synthesize every stack.
    ///
    /// Returns an assembly only when every stack validated and resolved;
    /// otherwise nothing is produced.
    pub fn synth(&self) -> IacResult<CloudAssembly> {
        let errors = self.validate();
        if !errors.is_empty() {
            warn!("Synthesis aborted: {} validation error(s)", errors.len());
            return Err(IacError::Validation(errors));
        }

        let graph = self.graph()?;
        let deploy_order = graph.deploy_order()?;

        let mut templates = BTreeMap::new();
        let mut artifacts = BTreeMap::new();
        for stack in self.stacks.values() {
            templates.insert(stack.name().to_string(), self.synth_stack(stack, &graph)?);
            artifacts.insert(
                stack.name().to_string(),
                Artifact {
                    artifact_type: STACK_ARTIFACT.to_string(),
                    environment: stack.env().uri(),
                    properties: ArtifactProperties {
                        template_file: template_file(stack.name()),
                    },
                    dependencies: graph.dependencies(stack.name()),
                },
            );
        }

        info!(
            "Synthesized {} stack(s), deploy order: {}",
            templates.len(),
            deploy_order.join(", ")
        );
        Ok(CloudAssembly::new(
            templates,
            Manifest {
                version: MANIFEST_VERSION.to_string(),
                artifacts,
                deploy_order,
            },
        ))
    }

    fn synth_stack(&self, stack: &Stack, graph: &DependencyGraph) -> IacResult<Template> {
        let generated = graph.generated_resources(stack.name(), &self.config.bridge);
        let exported = graph.exported_outputs(stack.name());

        let taken: BTreeSet<&String> = stack.resources().keys().chain(stack.outputs().keys()).collect();
        if let Some(id) = generated.keys().chain(exported.keys()).find(|id| taken.contains(id)) {
            return Err(IacError::LogicalIdCollision {
                stack: stack.name().to_string(),
                logical_id: id.clone(),
            });
        }

        let mut resources: BTreeMap<String, Prop> = stack
            .resources()
            .iter()
            .map(|(id, resource)| (id.clone(), resource.to_prop()))
            .collect();
        resources.extend(generated);

        let mut outputs: BTreeMap<String, Prop> = stack
            .outputs()
            .iter()
            .map(|(id, output)| (id.clone(), output.to_prop()))
            .collect();
        outputs.extend(exported.into_iter().map(|(id, output)| (id, output.to_prop())));

        let ctx = ResolveContext::new(stack.name(), &self.tokens, graph.references());
        let mut resolver = Resolver::new(ctx);

        let mut template = Template::new();
        template.description = stack.description().map(String::from);
        template.resources = resolve_section(&mut resolver, &resources)?;
        template.outputs = resolve_section(&mut resolver, &outputs)?;
        add_bootstrap(&mut template, &self.config.synthesizer);
        Ok(template)
    }
}

fn resolve_section(resolver: &mut Resolver<'_>, section: &BTreeMap<String, Prop>) -> IacResult<BTreeMap<String, Value>> {
    let mut resolved = BTreeMap::new();
    for (id, prop) in section {
        resolved.insert(id.clone(), resolver.resolve(prop)?);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use crate::stack::{OutputDef, Resource};
    use serde_json::json;

    const ACCOUNT: &str = "111111111111";

    fn app_with(stacks: &[(&str, &str)]) -> App {
        let mut app = App::new();
        for (name, region) in stacks {
            app.add_stack(Stack::new(*name, Environment::new(ACCOUNT, *region)))
                .unwrap();
        }
        app
    }

    #[test]
    fn test_single_stack_template() {
        let mut app = app_with(&[("Storage", "us-east-1")]);
        let bucket = app.reference("Storage", "Bucket");
        let stack = app.stack_mut("Storage").unwrap();
        stack.add_resource("Bucket", Resource::new("AWS::S3::Bucket")).unwrap();
        stack
            .add_output("BucketName", OutputDef::new(bucket))
            .unwrap();

        let assembly = app.synth().unwrap();
        let template = assembly.template("Storage").unwrap();
        assert_eq!(template.outputs["BucketName"], json!({"Value": {"Ref": "Bucket"}}));
        assert!(template.parameters.contains_key("BootstrapVersion"));
        assert!(template.rules.contains_key("CheckBootstrapVersion"));
    }

    #[test]
    fn test_get_att_logical_name() {
        let mut app = app_with(&[("Data", "us-east-1")]);
        let token = app.get_att("Data", "Db", "Endpoint.Address");
        let reference = token.as_reference().unwrap();
        assert_eq!(reference.logical_name(), "DbEndpointAddress");
        assert_eq!(reference.target(), &intrinsics::get_att("Db", "Endpoint.Address"));
    }

    #[test]
    fn test_duplicate_stack() {
        let mut app = app_with(&[("A", "us-east-1")]);
        let err = app
            .add_stack(Stack::new("A", Environment::agnostic()))
            .unwrap_err();
        assert!(matches!(err, IacError::DuplicateStack(_)));
    }

    #[test]
    fn test_validation_errors_are_collected() {
        let mut app = app_with(&[("A", "us-east-1"), ("B", "us-east-1")]);
        app.stack_mut("A")
            .unwrap()
            .add_resource("Queue", Resource::new("Queue"))
            .unwrap()
            .add_dependency("Nowhere");
        for stack in ["A", "B"] {
            app.stack_mut(stack)
                .unwrap()
                .add_output("Out", OutputDef::new("v").with_export_name("shared"))
                .unwrap();
        }

        let err = app.synth().unwrap_err();
        let paths: Vec<&str> = err.validation_errors().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["A/Queue", "A", "B/Out"]);
    }

    #[test]
    fn test_generated_id_collision() {
        let mut app = app_with(&[("A", "us-east-1"), ("B", "us-west-2")]);
        let x = app.reference("A", "X");
        app.stack_mut("A").unwrap().add_resource("X", Resource::new("AWS::SNS::Topic")).unwrap();
        let b = app.stack_mut("B").unwrap();
        b.add_resource("ExportsReaderUsEast1", Resource::new("AWS::SNS::Topic")).unwrap();
        b.add_output("TopicArn", OutputDef::new(x)).unwrap();

        let err = app.synth().unwrap_err();
        assert!(matches!(
            err,
            IacError::LogicalIdCollision { ref stack, ref logical_id }
                if stack == "B" && logical_id == "ExportsReaderUsEast1"
        ));
    }

    #[test]
    fn test_explicit_dependency_in_manifest() {
        let mut app = app_with(&[("A", "us-east-1"), ("B", "us-east-1")]);
        app.stack_mut("A").unwrap().add_dependency("B");

        let assembly = app.synth().unwrap();
        assert_eq!(assembly.deploy_order(), ["B".to_string(), "A".to_string()]);
        assert_eq!(assembly.dependencies("A"), ["B".to_string()]);
        assert!(assembly.dependencies("B").is_empty());
    }
}
