//! Stacks and their resources.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use mity_core::Prop;

use crate::environment::Environment;
use crate::error::{IacError, IacResult, ValidationError};

static STACK_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9-]{0,127}$").expect("valid regex"));
static LOGICAL_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{1,255}$").expect("valid regex"));
static RESOURCE_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9]+::[A-Za-z0-9]+::[A-Za-z0-9]+|Custom::[A-Za-z0-9_@-]{1,60})$")
        .expect("valid regex")
});
static REGION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]{2}(-[a-z]+)+-[0-9]+$").expect("valid regex"));
static ACCOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{12}$").expect("valid regex"));

/// Whether `id` is usable as a template logical id.
pub fn is_logical_id(id: &str) -> bool {
    LOGICAL_ID.is_match(id)
}

/// Construct validation hook.
///
/// Implementations return every problem they find; synthesis collects the
/// errors of all constructs before failing.
pub trait Validate {
    fn validate(&self, path: &str) -> Vec<ValidationError>;
}

/// A resource declaration.
#[derive(Debug, Clone)]
pub struct Resource {
    pub resource_type: String,
    pub properties: Prop,
    pub depends_on: BTreeSet<String>,
    pub deletion_policy: Option<String>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties: Prop::empty_map(),
            depends_on: BTreeSet::new(),
            deletion_policy: None,
        }
    }

    pub fn with_properties(mut self, properties: Prop) -> Self {
        self.properties = properties;
        self
    }

    /// Set one property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Prop>) -> Self {
        if !matches!(self.properties, Prop::Map(_)) {
            self.properties = Prop::empty_map();
        }
        self.properties.insert(key, value.into());
        self
    }

    pub fn with_depends_on(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.insert(logical_id.into());
        self
    }

    pub fn with_deletion_policy(mut self, policy: impl Into<String>) -> Self {
        self.deletion_policy = Some(policy.into());
        self
    }

    /// Template entry for this resource.
    pub fn to_prop(&self) -> Prop {
        let mut entry = BTreeMap::new();
        entry.insert("Type".to_string(), Prop::from(self.resource_type.as_str()));
        let empty = matches!(&self.properties, Prop::Map(m) if m.is_empty()) || self.properties.is_null();
        if !empty {
            entry.insert("Properties".to_string(), self.properties.clone());
        }
        if !self.depends_on.is_empty() {
            entry.insert(
                "DependsOn".to_string(),
                Prop::list(self.depends_on.iter().map(|d| Prop::from(d.as_str()))),
            );
        }
        if let Some(policy) = &self.deletion_policy {
            entry.insert("DeletionPolicy".to_string(), Prop::from(policy.as_str()));
        }
        Prop::Map(entry)
    }
}

impl Validate for Resource {
    fn validate(&self, path: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if !RESOURCE_TYPE.is_match(&self.resource_type) {
            errors.push(ValidationError::new(
                path,
                format!("invalid resource type '{}'", self.resource_type),
            ));
        }
        if !matches!(self.properties, Prop::Map(_) | Prop::Null | Prop::Token(_)) {
            errors.push(ValidationError::new(path, "properties must be a mapping"));
        }
        if let Some(policy) = &self.deletion_policy {
            if !["Delete", "Retain", "Snapshot", "RetainExceptOnCreate"].contains(&policy.as_str()) {
                errors.push(ValidationError::new(
                    path,
                    format!("invalid deletion policy '{}'", policy),
                ));
            }
        }
        errors
    }
}

/// A stack output.
#[derive(Debug, Clone)]
pub struct OutputDef {
    pub value: Prop,
    pub description: Option<String>,
    pub export_name: Option<String>,
}

impl OutputDef {
    pub fn new(value: impl Into<Prop>) -> Self {
        Self {
            value: value.into(),
            description: None,
            export_name: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_export_name(mut self, name: impl Into<String>) -> Self {
        self.export_name = Some(name.into());
        self
    }

    pub fn to_prop(&self) -> Prop {
        let mut entry = BTreeMap::new();
        entry.insert("Value".to_string(), self.value.clone());
        if let Some(description) = &self.description {
            entry.insert("Description".to_string(), Prop::from(description.as_str()));
        }
        if let Some(name) = &self.export_name {
            entry.insert(
                "Export".to_string(),
                Prop::map([("Name", Prop::from(name.as_str()))]),
            );
        }
        Prop::Map(entry)
    }
}

impl Validate for OutputDef {
    fn validate(&self, path: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.value.is_null() {
            errors.push(ValidationError::new(path, "output value must not be null"));
        }
        if matches!(&self.export_name, Some(name) if name.trim().is_empty()) {
            errors.push(ValidationError::new(path, "export name must not be empty"));
        }
        errors
    }
}

/// An independently deployable unit.
#[derive(Clone)]
pub struct Stack {
    name: String,
    env: Environment,
    description: Option<String>,
    resources: BTreeMap<String, Resource>,
    outputs: BTreeMap<String, OutputDef>,
    dependencies: BTreeSet<String>,
    cross_region_references: bool,
    validations: Vec<Arc<dyn Validate + Send + Sync>>,
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("name", &self.name)
            .field("env", &self.env)
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("outputs", &self.outputs.keys().collect::<Vec<_>>())
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

impl Stack {
    pub fn new(name: impl Into<String>, env: Environment) -> Self {
        Self {
            name: name.into(),
            env,
            description: None,
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
            dependencies: BTreeSet::new(),
            cross_region_references: true,
            validations: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Allow or forbid bridged references into this stack.
    pub fn with_cross_region_references(mut self, enabled: bool) -> Self {
        self.cross_region_references = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn cross_region_references(&self) -> bool {
        self.cross_region_references
    }

    pub fn resources(&self) -> &BTreeMap<String, Resource> {
        &self.resources
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id)
    }

    pub fn outputs(&self) -> &BTreeMap<String, OutputDef> {
        &self.outputs
    }

    /// Stacks that must deploy before this one, besides reference edges.
    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    /// Add a resource; logical ids are unique per stack.
    pub fn add_resource(&mut self, logical_id: impl Into<String>, resource: Resource) -> IacResult<&mut Self> {
        let logical_id = logical_id.into();
        if self.resources.contains_key(&logical_id) {
            return Err(IacError::DuplicateResource {
                path: format!("{}/{}", self.name, logical_id),
            });
        }
        debug!("Adding {} ({}) to {}", logical_id, resource.resource_type, self.name);
        self.resources.insert(logical_id, resource);
        Ok(self)
    }

    /// Add an output; output ids are unique per stack.
    pub fn add_output(&mut self, id: impl Into<String>, output: OutputDef) -> IacResult<&mut Self> {
        let id = id.into();
        if self.outputs.contains_key(&id) {
            return Err(IacError::DuplicateResource {
                path: format!("{}/{}", self.name, id),
            });
        }
        self.outputs.insert(id, output);
        Ok(self)
    }

    /// Require `stack` to deploy before this one.
    pub fn add_dependency(&mut self, stack: impl Into<String>) -> &mut Self {
        self.dependencies.insert(stack.into());
        self
    }

    /// Attach a custom validation run during synthesis.
    pub fn add_validation(&mut self, validation: impl Validate + Send + Sync + 'static) -> &mut Self {
        self.validations.push(Arc::new(validation));
        self
    }

    /// All property trees of this stack keyed by template section.
    pub(crate) fn body(&self) -> Prop {
        Prop::map([
            (
                "Resources",
                Prop::Map(
                    self.resources
                        .iter()
                        .map(|(id, r)| (id.clone(), r.to_prop()))
                        .collect(),
                ),
            ),
            (
                "Outputs",
                Prop::Map(
                    self.outputs
                        .iter()
                        .map(|(id, o)| (id.clone(), o.to_prop()))
                        .collect(),
                ),
            ),
        ])
    }
}

impl Validate for Stack {
    fn validate(&self, path: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !STACK_NAME.is_match(&self.name) {
            errors.push(ValidationError::new(
                path,
                format!("invalid stack name '{}'", self.name),
            ));
        }
        if let Some(account) = &self.env.account {
            if !ACCOUNT.is_match(account) {
                errors.push(ValidationError::new(path, format!("invalid account '{}'", account)));
            }
        }
        if let Some(region) = &self.env.region {
            if !REGION.is_match(region) {
                errors.push(ValidationError::new(path, format!("invalid region '{}'", region)));
            }
        }
        if self.dependencies.contains(&self.name) {
            errors.push(ValidationError::new(path, "stack cannot depend on itself"));
        }

        for (id, resource) in &self.resources {
            let resource_path = format!("{}/{}", path, id);
            if !is_logical_id(id) {
                errors.push(ValidationError::new(&resource_path, "logical id must be alphanumeric"));
            }
            errors.extend(resource.validate(&resource_path));
            for dependency in &resource.depends_on {
                if !self.resources.contains_key(dependency) {
                    errors.push(ValidationError::new(
                        &resource_path,
                        format!("DependsOn references unknown resource '{}'", dependency),
                    ));
                }
            }
        }

        for (id, output) in &self.outputs {
            let output_path = format!("{}/{}", path, id);
            if !is_logical_id(id) {
                errors.push(ValidationError::new(&output_path, "output id must be alphanumeric"));
            }
            if self.resources.contains_key(id) {
                errors.push(ValidationError::new(
                    &output_path,
                    "output id clashes with a resource logical id",
                ));
            }
            errors.extend(output.validate(&output_path));
        }

        for validation in &self.validations {
            errors.extend(validation.validate(path));
        }
        errors
    }
}
