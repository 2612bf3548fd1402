//! mITyFactory CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Validation failure
//! - 4: Reference error
//! - 5: Bridge error

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands};
use mity_bridge::BridgeError;
use mity_core::CoreError;
use mity_iac::IacError;

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const VALIDATION_FAILURE: u8 = 3;
    pub const REFERENCE_ERROR: u8 = 4;
    pub const BRIDGE_ERROR: u8 = 5;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match cli.command {
        Commands::Synth(args) => commands::synth::execute(args).await,
        Commands::Graph(args) => commands::graph::execute(args).await,
        Commands::Invoke(args) => commands::invoke::execute(args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

fn init_logging(cli: &Cli) {
    let default_level = if cli.verbose {
        "mity=debug"
    } else if cli.quiet {
        "mity=warn"
    } else {
        "mity=info"
    };
    let mut filter = EnvFilter::from_default_env();
    for directive in [default_level, "warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    let registry = tracing_subscriber::registry().with(filter);
    // Logging may already be initialized; keep going either way.
    let _ = if cli.json_logs {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if let Some(err) = e.downcast_ref::<IacError>() {
        return match err {
            IacError::Validation(_)
            | IacError::DuplicateStack(_)
            | IacError::DuplicateResource { .. }
            | IacError::LogicalIdCollision { .. }
            | IacError::InvalidDefinition(_) => ExitCodes::VALIDATION_FAILURE,
            IacError::CrossBoundary { .. }
            | IacError::StackCycle { .. }
            | IacError::UnknownStack(_)
            | IacError::ExportConflict { .. }
            | IacError::Core(_) => ExitCodes::REFERENCE_ERROR,
            IacError::Yaml(_) | IacError::Json(_) => ExitCodes::INVALID_ARGS,
            IacError::Io(_) => ExitCodes::GENERAL_ERROR,
        };
    }
    if e.downcast_ref::<CoreError>().is_some() {
        return ExitCodes::REFERENCE_ERROR;
    }
    if e.downcast_ref::<BridgeError>().is_some() {
        return ExitCodes::BRIDGE_ERROR;
    }

    let msg = e.to_string().to_lowercase();
    if msg.contains("argument") || msg.contains("not found") {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}
