//! Cloud assembly: the synthesized templates plus a manifest.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::IacResult;
use crate::template::Template;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: &str = "1.0.0";
pub const STACK_ARTIFACT: &str = "aws:cloudformation:stack";

/// File name of a stack's template inside the assembly.
pub fn template_file(stack: &str) -> String {
    format!("{}.template.json", stack)
}

/// Assembly manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: String,
    pub artifacts: BTreeMap<String, Artifact>,
    /// Stacks in deploy order.
    pub deploy_order: Vec<String>,
}

/// One deployable artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub environment: String,
    pub properties: ArtifactProperties,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactProperties {
    pub template_file: String,
}

/// In-memory result of a successful synthesis.
#[derive(Debug, Clone)]
pub struct CloudAssembly {
    templates: BTreeMap<String, Template>,
    manifest: Manifest,
}

impl CloudAssembly {
    pub fn new(templates: BTreeMap<String, Template>, manifest: Manifest) -> Self {
        Self { templates, manifest }
    }

    pub fn template(&self, stack: &str) -> Option<&Template> {
        self.templates.get(stack)
    }

    pub fn templates(&self) -> &BTreeMap<String, Template> {
        &self.templates
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn deploy_order(&self) -> &[String] {
        &self.manifest.deploy_order
    }

    /// Stacks `stack` must deploy after.
    pub fn dependencies(&self, stack: &str) -> &[String] {
        self.manifest
            .artifacts
            .get(stack)
            .map(|a| a.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// Write the assembly to `out`, replacing any previous contents.
    ///
    /// Files are staged in a sibling temporary directory that is renamed
    /// into place once complete, so `out` never holds a partial assembly.
    /// A previous assembly is moved aside first and only removed after the
    /// swap; if the swap fails it is moved back.
    pub fn write_to(&self, out: &Path) -> IacResult<()> {
        let parent = match out.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let staging = tempfile::Builder::new()
            .prefix(".mity-assembly-")
            .tempdir_in(&parent)?;
        for (stack, template) in &self.templates {
            fs::write(staging.path().join(template_file(stack)), template.to_json_pretty()?)?;
        }
        fs::write(
            staging.path().join(MANIFEST_FILE),
            serde_json::to_string_pretty(&self.manifest)?,
        )?;

        let previous = if out.exists() {
            let holder = tempfile::Builder::new()
                .prefix(".mity-previous-")
                .tempdir_in(&parent)?;
            let aside = holder.path().join("assembly");
            fs::rename(out, &aside)?;
            Some((holder, aside))
        } else {
            None
        };

        if let Err(err) = fs::rename(staging.path(), out) {
            if let Some((_, aside)) = &previous {
                fs::rename(aside, out)?;
            }
            return Err(err.into());
        }
        // Dropping the holder removes the previous assembly.
        drop(previous);

        info!("Wrote {} template(s) to {:?}", self.templates.len(), out);
        Ok(())
    }

    /// Read a manifest written by [`CloudAssembly::write_to`].
    pub fn read_manifest(dir: &Path) -> IacResult<Manifest> {
        let content = fs::read_to_string(dir.join(MANIFEST_FILE))?;
        Ok(serde_json::from_str(&content)?)
    }
}
