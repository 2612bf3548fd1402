//! CLI command definitions.
//!
//! Each subcommand drives one stage: synthesizing an app definition,
//! inspecting its stack graph, or running the export bridge handler
//! locally.

use clap::{Parser, Subcommand};

pub mod graph;
pub mod invoke;
pub mod synth;

/// mITyFactory - stack synthesis with cross-stack references
#[derive(Parser)]
#[command(name = "mity")]
#[command(version, about = "mITyFactory - stack synthesis with cross-stack references")]
#[command(long_about = r#"
mITyFactory synthesizes multi-stack apps into deployable templates,
rewriting references between stacks into imports or export bridges.

COMMANDS:
  synth   → Synthesize an app definition into a cloud assembly
  graph   → Show stack dependencies, deploy order and bridges
  invoke  → Run the export bridge handler against a local store

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Validation failure
  4 - Reference error
  5 - Bridge error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long = "json-logs", global = true, env = "MITY_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synthesize an app definition into a cloud assembly
    Synth(synth::SynthArgs),

    /// Show the stack graph of an app definition
    Graph(graph::GraphArgs),

    /// Run the export bridge handler for one lifecycle event
    Invoke(invoke::InvokeArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_synth() {
        let cli = Cli::parse_from(["mity", "synth", "--app", "app.yaml", "--out", "build"]);
        match cli.command {
            Commands::Synth(args) => {
                assert_eq!(args.app.to_str(), Some("app.yaml"));
                assert_eq!(args.out.to_str(), Some("build"));
            }
            _ => panic!("expected synth"),
        }
    }
}
