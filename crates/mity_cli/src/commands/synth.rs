//! Synth command - Write a cloud assembly for an app definition.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use mity_iac::AppDefinition;

#[derive(Args)]
pub struct SynthArgs {
    /// App definition file (YAML)
    #[arg(short, long, default_value = "mity.yaml", env = "MITY_APP")]
    pub app: PathBuf,

    /// Output directory for the assembly
    #[arg(short, long, default_value = "mity.out", env = "MITY_OUT")]
    pub out: PathBuf,

    /// Override the exports prefix of the definition
    #[arg(long)]
    pub exports_prefix: Option<String>,
}

pub async fn execute(args: SynthArgs) -> Result<()> {
    if !args.app.exists() {
        anyhow::bail!("App definition not found: {}", args.app.display());
    }
    info!("Synthesizing {}", args.app.display());

    let mut definition = AppDefinition::from_file(&args.app)?;
    if let Some(prefix) = args.exports_prefix {
        definition.config = definition.config.with_exports_prefix(prefix);
    }

    let app = definition.into_app()?;
    let assembly = app.synth()?;
    assembly
        .write_to(&args.out)
        .with_context(|| format!("writing assembly to {}", args.out.display()))?;

    println!("✅ Synthesized {} stack(s) to {}", assembly.templates().len(), args.out.display());
    for stack in assembly.deploy_order() {
        let dependencies = assembly.dependencies(stack);
        if dependencies.is_empty() {
            println!("   {}", stack);
        } else {
            println!("   {} (after {})", stack, dependencies.join(", "));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mity_iac::{CloudAssembly, IacError, MANIFEST_FILE};
    use tempfile::tempdir;

    const APP: &str = r#"
stacks:
  Network:
    env: { account: "111111111111", region: us-east-1 }
    resources:
      Vpc:
        type: AWS::EC2::VPC
  Service:
    env: { account: "111111111111", region: us-west-2 }
    outputs:
      VpcId:
        value: "${Network.Vpc}"
"#;

    #[tokio::test]
    async fn test_synth_writes_assembly() {
        let dir = tempdir().unwrap();
        let app = dir.path().join("mity.yaml");
        std::fs::write(&app, APP).unwrap();
        let out = dir.path().join("mity.out");

        execute(SynthArgs {
            app,
            out: out.clone(),
            exports_prefix: Some("platform/exports".to_string()),
        })
        .await
        .unwrap();

        assert!(out.join(MANIFEST_FILE).exists());
        let manifest = CloudAssembly::read_manifest(&out).unwrap();
        assert_eq!(manifest.deploy_order, vec!["Network", "Service"]);

        let service = std::fs::read_to_string(out.join("Service.template.json")).unwrap();
        assert!(service.contains("/platform/exports/Network/Vpc"));
    }

    #[tokio::test]
    async fn test_synth_missing_definition() {
        let dir = tempdir().unwrap();
        let err = execute(SynthArgs {
            app: dir.path().join("absent.yaml"),
            out: dir.path().join("out"),
            exports_prefix: None,
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_synth_invalid_app_writes_nothing() {
        let dir = tempdir().unwrap();
        let app = dir.path().join("mity.yaml");
        std::fs::write(
            &app,
            "stacks:\n  Bad:\n    resources:\n      Thing:\n        type: nonsense\n",
        )
        .unwrap();
        let out = dir.path().join("mity.out");

        let err = execute(SynthArgs {
            app,
            out: out.clone(),
            exports_prefix: None,
        })
        .await
        .unwrap_err();

        assert!(matches!(err.downcast_ref::<IacError>(), Some(IacError::Validation(_))));
        assert!(!out.exists());
    }
}
