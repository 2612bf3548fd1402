//! Graph command - Show stack dependencies and generated bridges.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tracing::info;

use mity_iac::{AppDefinition, DependencyGraph};

#[derive(Args)]
pub struct GraphArgs {
    /// App definition file (YAML)
    #[arg(short, long, default_value = "mity.yaml", env = "MITY_APP")]
    pub app: PathBuf,

    /// Print the graph as JSON
    #[arg(long)]
    pub json: bool,
}

/// Printable view of a dependency graph.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphReport {
    pub deploy_order: Vec<String>,
    pub stacks: BTreeMap<String, StackReport>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackReport {
    pub depends_on: Vec<String>,
    /// Store keys published by the stack's export writer.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub writes: Vec<String>,
    /// Reader logical id to the store keys it reads.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub reads: BTreeMap<String, Vec<String>>,
}

impl GraphReport {
    pub fn from_graph(graph: &DependencyGraph) -> Result<Self> {
        let deploy_order = graph.deploy_order()?;
        let mut stacks = BTreeMap::new();
        for name in graph.stack_names() {
            let report = StackReport {
                depends_on: graph.dependencies(name),
                writes: graph
                    .writer(name)
                    .map(|writer| writer.keys().cloned().collect())
                    .unwrap_or_default(),
                reads: graph
                    .readers_of(name)
                    .map(|reader| (reader.logical_id(), reader.imports().keys().cloned().collect()))
                    .collect(),
            };
            stacks.insert(name.clone(), report);
        }
        Ok(Self { deploy_order, stacks })
    }
}

pub async fn execute(args: GraphArgs) -> Result<()> {
    if !args.app.exists() {
        anyhow::bail!("App definition not found: {}", args.app.display());
    }
    info!("Building stack graph for {}", args.app.display());

    let app = AppDefinition::from_file(&args.app)?.into_app()?;
    let report = GraphReport::from_graph(&app.graph()?)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("📦 Deploy order: {}", report.deploy_order.join(" → "));
    for name in &report.deploy_order {
        let Some(stack) = report.stacks.get(name) else {
            continue;
        };
        println!("\n{}", name);
        if !stack.depends_on.is_empty() {
            println!("   depends on: {}", stack.depends_on.join(", "));
        }
        for key in &stack.writes {
            println!("   writes {}", key);
        }
        for (reader, keys) in &stack.reads {
            for key in keys {
                println!("   reads {} via {}", key, reader);
            }
        }
    }
    Ok(())
}
