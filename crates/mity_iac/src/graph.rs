//! Stack dependency graph and cross-stack reference rewriting.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use mity_core::{intrinsics, CoreError, Prop, Reference, ReferenceTable, Token};

use crate::bridge::{ExportReaderBuilder, ExportWriterBuilder};
use crate::config::BridgeFunctionConfig;
use crate::environment::{classify, Boundary, Environment};
use crate::error::{IacError, IacResult};
use crate::stack::OutputDef;

#[derive(Debug, Clone)]
struct StackScope {
    env: Environment,
    cross_region_references: bool,
}

/// How a registered reference was expressed in the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    SameStack,
    Import,
    Bridged,
}

/// Producer/consumer relationships between stacks.
///
/// Owns the registries created while rewriting references: exported outputs
/// per producer, one export writer per producer and one export reader per
/// `(consumer, producer region)`.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    prefix: String,
    stacks: BTreeMap<String, StackScope>,
    /// Consumer to the producers it waits for.
    edges: BTreeMap<String, BTreeSet<String>>,
    references: ReferenceTable,
    exported_outputs: BTreeMap<String, BTreeMap<String, OutputDef>>,
    /// Target exported per `(producer, output suffix)`.
    export_targets: BTreeMap<(String, String), Prop>,
    writers: BTreeMap<String, ExportWriterBuilder>,
    readers: BTreeMap<(String, String), ExportReaderBuilder>,
}

impl DependencyGraph {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            stacks: BTreeMap::new(),
            edges: BTreeMap::new(),
            references: ReferenceTable::new(),
            exported_outputs: BTreeMap::new(),
            export_targets: BTreeMap::new(),
            writers: BTreeMap::new(),
            readers: BTreeMap::new(),
        }
    }

    /// Register a stack node.
    pub fn add_stack(&mut self, name: &str, env: Environment, cross_region_references: bool) -> IacResult<()> {
        if self.stacks.contains_key(name) {
            return Err(IacError::DuplicateStack(name.to_string()));
        }
        self.stacks.insert(
            name.to_string(),
            StackScope {
                env,
                cross_region_references,
            },
        );
        Ok(())
    }

    /// Require `producer` to deploy before `consumer`.
    pub fn add_dependency(&mut self, consumer: &str, producer: &str) -> IacResult<()> {
        for name in [consumer, producer] {
            if !self.stacks.contains_key(name) {
                return Err(IacError::UnknownStack(name.to_string()));
            }
        }
        self.add_edge(consumer, producer);
        Ok(())
    }

    fn add_edge(&mut self, consumer: &str, producer: &str) {
        let added = self
            .edges
            .entry(consumer.to_string())
            .or_default()
            .insert(producer.to_string());
        if added {
            debug!("{} now deploys after {}", consumer, producer);
        }
    }

    fn scope(&self, name: &str) -> IacResult<StackScope> {
        self.stacks
            .get(name)
            .cloned()
            .ok_or_else(|| IacError::UnknownStack(name.to_string()))
    }

    /// Decide how `consumer` reads `reference` and return the accessor.
    pub fn register_reference(&mut self, consumer: &str, reference: &Reference) -> IacResult<Prop> {
        Ok(self.register(consumer, reference)?.0)
    }

    fn register(&mut self, consumer: &str, reference: &Reference) -> IacResult<(Prop, ReferenceKind)> {
        let producer = reference.producer();
        let logical_name = reference.logical_name();
        let producer_scope = self.scope(producer)?;
        let consumer_scope = self.scope(consumer)?;

        if producer == consumer {
            return Ok((reference.target().clone(), ReferenceKind::SameStack));
        }
        self.claim_export(reference)?;

        match classify(&producer_scope.env, &consumer_scope.env) {
            Boundary::SameScope => {
                let output_id = format!("ExportsOutput{}", output_suffix(logical_name));
                let export_name = format!("{}:{}", producer, output_id);
                self.exported_outputs
                    .entry(producer.to_string())
                    .or_default()
                    .entry(output_id)
                    .or_insert_with(|| {
                        OutputDef::new(reference.target().clone()).with_export_name(export_name.as_str())
                    });
                self.add_edge(consumer, producer);
                debug!("{} imports {} from {}", consumer, export_name, producer);
                Ok((intrinsics::import_value(&export_name), ReferenceKind::Import))
            }
            Boundary::CrossRegion { producer_region } => {
                if !consumer_scope.cross_region_references {
                    return Err(IacError::CrossBoundary {
                        producer: producer.to_string(),
                        consumer: consumer.to_string(),
                        reason: format!(
                            "{} is in {} and cross-region references are disabled for {}",
                            producer, producer_region, consumer
                        ),
                    });
                }

                let prefix = self.prefix.clone();
                let key = self
                    .writers
                    .entry(producer.to_string())
                    .or_insert_with(|| {
                        info!("Adding export writer to {}", producer);
                        ExportWriterBuilder::new(producer, producer_region.as_str(), prefix.as_str())
                    })
                    .add_export(logical_name, reference.target())?;

                let reader = self
                    .readers
                    .entry((consumer.to_string(), producer_region.clone()))
                    .or_insert_with(|| {
                        info!("Adding export reader for {} to {}", producer_region, consumer);
                        ExportReaderBuilder::new(consumer, producer_region.as_str(), prefix.as_str())
                    });
                reader.add_import(producer, logical_name);
                let accessor = reader.attribute(&key);

                self.add_edge(consumer, producer);
                debug!("{} reads {} through a bridge", consumer, key);
                Ok((accessor, ReferenceKind::Bridged))
            }
            Boundary::Unsupported(reason) => Err(IacError::CrossBoundary {
                producer: producer.to_string(),
                consumer: consumer.to_string(),
                reason,
            }),
        }
    }

    /// Record the target exported under a reference's logical name.
    ///
    /// Output ids and store keys are derived from the logical name, so two
    /// targets mapping to the same name would share one export.
    fn claim_export(&mut self, reference: &Reference) -> IacResult<()> {
        let slot = (
            reference.producer().to_string(),
            output_suffix(reference.logical_name()),
        );
        match self.export_targets.get(&slot) {
            Some(existing) if existing != reference.target() => Err(IacError::export_conflict(
                reference.producer(),
                reference.logical_name(),
                existing,
                reference.target(),
            )),
            Some(_) => Ok(()),
            None => {
                self.export_targets.insert(slot, reference.target().clone());
                Ok(())
            }
        }
    }

    /// Register a reference token discovered while resolving `consumer`.
    pub fn register_token(&mut self, consumer: &str, token: &Token) -> IacResult<ReferenceKind> {
        let reference = token.as_reference().ok_or_else(|| {
            IacError::Core(CoreError::Resolution(format!(
                "{} is not a reference",
                token.marker()
            )))
        })?;
        let (accessor, kind) = self.register(consumer, reference)?;
        self.references.insert(consumer, token.id(), accessor);
        Ok(kind)
    }

    /// Rewritten references, for resolution.
    pub fn references(&self) -> &ReferenceTable {
        &self.references
    }

    pub fn stack_names(&self) -> impl Iterator<Item = &String> {
        self.stacks.keys()
    }

    /// Stacks `stack` must deploy after.
    pub fn dependencies(&self, stack: &str) -> Vec<String> {
        self.edges
            .get(stack)
            .map(|producers| producers.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn writer(&self, producer: &str) -> Option<&ExportWriterBuilder> {
        self.writers.get(producer)
    }

    pub fn reader(&self, consumer: &str, region: &str) -> Option<&ExportReaderBuilder> {
        self.readers.get(&(consumer.to_string(), region.to_string()))
    }

    /// Readers owned by `consumer`, by producer region.
    pub fn readers_of<'a>(&'a self, consumer: &'a str) -> impl Iterator<Item = &'a ExportReaderBuilder> + 'a {
        self.readers
            .iter()
            .filter(move |((owner, _), _)| owner == consumer)
            .map(|(_, reader)| reader)
    }

    /// Outputs `producer` must export for same-scope imports.
    pub fn exported_outputs(&self, producer: &str) -> BTreeMap<String, OutputDef> {
        self.exported_outputs.get(producer).cloned().unwrap_or_default()
    }

    /// Bridge resources to add to `stack`'s template.
    pub fn generated_resources(&self, stack: &str, function: &BridgeFunctionConfig) -> BTreeMap<String, Prop> {
        let mut resources = BTreeMap::new();
        if let Some(writer) = self.writers.get(stack).filter(|w| !w.is_empty()) {
            resources.extend(writer.resources(function));
        }
        for reader in self.readers_of(stack) {
            resources.extend(reader.resources(function));
        }
        resources
    }

    /// Deploy order: producers first, ties broken by name.
    pub fn deploy_order(&self) -> IacResult<Vec<String>> {
        let mut pending: BTreeMap<&str, usize> = self
            .stacks
            .keys()
            .map(|name| (name.as_str(), self.edges.get(name).map_or(0, BTreeSet::len)))
            .collect();
        let mut ready: BTreeSet<&str> = pending
            .iter()
            .filter(|(_, waiting)| **waiting == 0)
            .map(|(name, _)| *name)
            .collect();

        let mut order = Vec::with_capacity(pending.len());
        while let Some(next) = ready.pop_first() {
            pending.remove(next);
            order.push(next.to_string());
            for (consumer, producers) in &self.edges {
                if !producers.contains(next) {
                    continue;
                }
                if let Some(waiting) = pending.get_mut(consumer.as_str()) {
                    *waiting -= 1;
                    if *waiting == 0 {
                        ready.insert(consumer.as_str());
                    }
                }
            }
        }

        if pending.is_empty() {
            Ok(order)
        } else {
            let blocked: BTreeSet<&str> = pending.keys().copied().collect();
            Err(IacError::StackCycle {
                path: self.find_cycle(&blocked),
            })
        }
    }

    /// Follow unmet dependencies from the first blocked stack until one repeats.
    fn find_cycle(&self, blocked: &BTreeSet<&str>) -> Vec<String> {
        let Some(start) = blocked.iter().next().copied() else {
            return Vec::new();
        };
        let mut path = vec![start];
        let mut current = start;
        loop {
            let next = self
                .edges
                .get(current)
                .and_then(|producers| producers.iter().find(|p| blocked.contains(p.as_str())));
            let Some(next) = next else {
                return path.into_iter().map(String::from).collect();
            };
            if let Some(pos) = path.iter().position(|name| *name == next.as_str()) {
                let mut cycle: Vec<String> = path[pos..].iter().map(|name| name.to_string()).collect();
                cycle.push(next.clone());
                return cycle;
            }
            path.push(next.as_str());
            current = next.as_str();
        }
    }
}

/// Output id suffix derived from a logical name.
fn output_suffix(logical_name: &str) -> String {
    logical_name.chars().filter(char::is_ascii_alphanumeric).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mity_core::TokenMap;

    const ACCOUNT: &str = "111111111111";

    fn graph(stacks: &[(&str, &str)]) -> DependencyGraph {
        let mut graph = DependencyGraph::new("mity/exports");
        for (name, region) in stacks {
            graph
                .add_stack(name, Environment::new(ACCOUNT, *region), true)
                .unwrap();
        }
        graph
    }

    fn reference(producer: &str, id: &str) -> Reference {
        Reference::new(producer, id, intrinsics::reference(id))
    }

    #[test]
    fn test_same_stack_uses_target() {
        let mut g = graph(&[("A", "us-east-1")]);
        let accessor = g.register_reference("A", &reference("A", "Bucket")).unwrap();
        assert_eq!(accessor, intrinsics::reference("Bucket"));
        assert!(g.dependencies("A").is_empty());
    }

    #[test]
    fn test_same_scope_imports_output() {
        let mut g = graph(&[("C", "us-east-1"), ("D", "us-east-1")]);
        let accessor = g.register_reference("C", &reference("D", "Table")).unwrap();

        assert_eq!(accessor, intrinsics::import_value("D:ExportsOutputTable"));
        let outputs = g.exported_outputs("D");
        assert_eq!(
            outputs["ExportsOutputTable"].export_name.as_deref(),
            Some("D:ExportsOutputTable")
        );
        assert_eq!(g.dependencies("C"), vec!["D".to_string()]);
        assert!(g.generated_resources("C", &BridgeFunctionConfig::default()).is_empty());
        assert!(g.generated_resources("D", &BridgeFunctionConfig::default()).is_empty());
    }

    #[test]
    fn test_same_scope_conflicting_targets_fail() {
        let mut g = graph(&[("A", "us-east-1"), ("B", "us-east-1")]);
        let first = Reference::new("A", "DbEndpointAddress", intrinsics::get_att("Db", "Endpoint.Address"));
        let second = Reference::new("A", "DbEndpointAddress", intrinsics::get_att("DbEndpoint", "Address"));

        g.register_reference("B", &first).unwrap();
        g.register_reference("B", &first).unwrap();
        let err = g.register_reference("B", &second).unwrap_err();
        assert!(matches!(
            err,
            IacError::ExportConflict { ref producer, ref logical_name, .. }
                if producer == "A" && logical_name == "DbEndpointAddress"
        ));
        assert_eq!(g.exported_outputs("A").len(), 1);
    }

    #[test]
    fn test_cross_region_conflicting_targets_fail() {
        let mut g = graph(&[("A", "us-east-1"), ("B", "us-west-2"), ("C", "us-east-1")]);
        g.register_reference("B", &reference("A", "Queue")).unwrap();

        let other = Reference::new("A", "Queue", intrinsics::get_att("Queue", "Arn"));
        assert!(matches!(
            g.register_reference("C", &other),
            Err(IacError::ExportConflict { .. })
        ));
    }

    #[test]
    fn test_cross_region_shares_one_reader() {
        let mut g = graph(&[("A", "us-east-1"), ("B", "us-west-2")]);
        let x = g.register_reference("B", &reference("A", "X")).unwrap();
        let y = g.register_reference("B", &reference("A", "Y")).unwrap();
        g.register_reference("B", &reference("A", "X")).unwrap();

        assert_eq!(x, intrinsics::get_att("ExportsReaderUsEast1", "/mity/exports/A/X"));
        assert_eq!(y, intrinsics::get_att("ExportsReaderUsEast1", "/mity/exports/A/Y"));
        assert_eq!(g.readers_of("B").count(), 1);
        assert_eq!(g.reader("B", "us-east-1").unwrap().imports().len(), 2);
        assert_eq!(g.writer("A").unwrap().len(), 2);
        assert_eq!(g.dependencies("B"), vec!["A".to_string()]);
    }

    #[test]
    fn test_reader_per_producer_region() {
        let mut g = graph(&[("A", "us-east-1"), ("E", "eu-west-1"), ("B", "us-west-2")]);
        g.register_reference("B", &reference("A", "X")).unwrap();
        g.register_reference("B", &reference("E", "Z")).unwrap();

        let readers: Vec<String> = g.readers_of("B").map(|r| r.logical_id()).collect();
        assert_eq!(readers, vec!["ExportsReaderEuWest1", "ExportsReaderUsEast1"]);
    }

    #[test]
    fn test_unsupported_boundaries_name_both_stacks() {
        let mut g = DependencyGraph::new("mity/exports");
        g.add_stack("A", Environment::new(ACCOUNT, "us-east-1"), true).unwrap();
        g.add_stack("F", Environment::new("222222222222", "us-east-1"), true).unwrap();
        g.add_stack("G", Environment::agnostic(), true).unwrap();
        g.add_stack("H", Environment::new(ACCOUNT, "us-west-2"), false).unwrap();

        for consumer in ["F", "G", "H"] {
            let err = g.register_reference(consumer, &reference("A", "X")).unwrap_err();
            match err {
                IacError::CrossBoundary { producer, consumer: c, .. } => {
                    assert_eq!(producer, "A");
                    assert_eq!(c, consumer);
                }
                other => panic!("unexpected error: {}", other),
            }
        }
        assert!(g.writer("A").is_none());
    }

    #[test]
    fn test_unknown_producer() {
        let mut g = graph(&[("A", "us-east-1")]);
        let err = g.register_reference("A", &reference("Missing", "X")).unwrap_err();
        assert!(matches!(err, IacError::UnknownStack(ref s) if s == "Missing"));
    }

    #[test]
    fn test_register_token_fills_table() {
        let mut tokens = TokenMap::new();
        let token = tokens.reference(reference("A", "X"));
        let literal = tokens.literal("Plain", "v");

        let mut g = graph(&[("A", "us-east-1"), ("B", "us-west-2")]);
        assert_eq!(g.register_token("B", &token).unwrap(), ReferenceKind::Bridged);
        assert!(g.references().contains("B", token.id()));
        assert!(g.register_token("B", &literal).is_err());
    }

    #[test]
    fn test_deploy_order_is_topological_and_stable() {
        let mut g = graph(&[("App", "us-east-1"), ("Data", "us-east-1"), ("Network", "us-east-1"), ("Zeta", "us-east-1")]);
        g.add_dependency("App", "Data").unwrap();
        g.add_dependency("Data", "Network").unwrap();
        g.add_dependency("App", "Network").unwrap();

        assert_eq!(g.deploy_order().unwrap(), vec!["Network", "Data", "App", "Zeta"]);
    }

    #[test]
    fn test_cycle_is_reported_with_path() {
        let mut g = graph(&[("A", "us-east-1"), ("B", "us-east-1"), ("C", "us-east-1")]);
        g.add_dependency("A", "B").unwrap();
        g.add_dependency("B", "A").unwrap();
        g.add_dependency("C", "A").unwrap();

        match g.deploy_order().unwrap_err() {
            IacError::StackCycle { path } => assert_eq!(path, vec!["A", "B", "A"]),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_duplicate_and_unknown_stacks() {
        let mut g = graph(&[("A", "us-east-1")]);
        assert!(matches!(
            g.add_stack("A", Environment::agnostic(), true),
            Err(IacError::DuplicateStack(_))
        ));
        assert!(matches!(
            g.add_dependency("A", "Nope"),
            Err(IacError::UnknownStack(_))
        ));
    }
}
