//! # mity_iac
//!
//! Stack synthesis for mITyFactory.
//!
//! An [`App`] holds stacks whose resources and outputs are property trees
//! that may carry tokens. Synthesis validates every stack, rewrites
//! references between stacks, resolves each template and returns a
//! [`CloudAssembly`].
//!
//! ## Features
//!
//! - Same-stack references resolve to `Ref` / `Fn::GetAtt`
//! - Same account and region: exported outputs read with `Fn::ImportValue`
//! - Cross-region: an export writer in the producer and one export reader
//!   per consumer and producer region, read through `Fn::GetAtt`
//! - Deterministic deploy order with cycle detection
//! - Bootstrap version gate in every template
//! - YAML app definitions
//!
//! ## Example
//!
//! ```rust,no_run
//! use mity_iac::{App, Environment, OutputDef, Resource, Stack};
//!
//! let mut app = App::new();
//! app.add_stack(Stack::new("Network", Environment::new("111111111111", "us-east-1"))).unwrap();
//! app.add_stack(Stack::new("Service", Environment::new("111111111111", "us-west-2"))).unwrap();
//!
//! let vpc = app.reference("Network", "Vpc");
//! app.stack_mut("Network").unwrap()
//!     .add_resource("Vpc", Resource::new("AWS::EC2::VPC")).unwrap();
//! app.stack_mut("Service").unwrap()
//!     .add_output("VpcId", OutputDef::new(vpc)).unwrap();
//!
//! let assembly = app.synth().unwrap();
//! assembly.write_to(std::path::Path::new("mity.out")).unwrap();
//! ```

pub mod app;
pub mod assembly;
pub mod bridge;
pub mod config;
pub mod definition;
pub mod environment;
pub mod error;
pub mod graph;
pub mod stack;
pub mod synthesizer;
pub mod template;

pub use app::App;
pub use assembly::{template_file, Artifact, CloudAssembly, Manifest, MANIFEST_FILE};
pub use bridge::{reader_id, ExportReaderBuilder, ExportWriterBuilder, WRITER_ID};
pub use config::{AppConfig, BridgeFunctionConfig, SynthesizerConfig};
pub use definition::AppDefinition;
pub use environment::{classify, Boundary, Environment};
pub use error::{IacError, IacResult, ValidationError};
pub use graph::{DependencyGraph, ReferenceKind};
pub use stack::{OutputDef, Resource, Stack, Validate};
pub use template::Template;
