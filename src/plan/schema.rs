//! Image plan data structures
//!
//! The plan is the serializable contract between composition, rendering, and
//! execution: a build stage that produces the isolated environment and a
//! runtime stage that assembles the deployable image. `validate()` enforces
//! the pipeline invariants before anything is rendered or built.

use super::{BUILD_STAGE_NAME, ENV_NO_BYTECODE, ENV_UNBUFFERED};
use crate::image::ImageRef;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

fn default_version() -> String {
    "1".to_string()
}

/// Root structure describing a complete two-stage image build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePlan {
    /// Schema version
    #[serde(default = "default_version")]
    pub version: String,
    /// Provenance of the plan
    #[serde(default)]
    pub metadata: PlanMetadata,
    /// Build stage: isolated dependency environment
    pub build: BuildStage,
    /// Runtime stage: minimal deployable image
    pub runtime: RuntimeStage,
}

/// Provenance recorded alongside the stages
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlanMetadata {
    /// Optional project name (defaults to the context directory name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    /// Fingerprint of the dependency manifest the plan was composed from
    #[serde(default)]
    pub manifest_fingerprint: String,
    /// Number of declared dependencies
    #[serde(default)]
    pub dependency_count: usize,
}

/// Build stage: creates the venv and installs the manifest into it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BuildStage {
    /// Pinned base image
    pub base: String,
    /// Working directory inside the stage
    #[serde(default)]
    pub workdir: String,
    /// Stage-scoped environment (bytecode-cache suppression)
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Context files copied into the stage (the manifest, nothing else)
    #[serde(default)]
    pub context: Vec<CopySpec>,
    /// Commands executed in order
    #[serde(default)]
    pub commands: Vec<String>,
    /// Venv subpath under the workdir; the stage's sole output artifact
    #[serde(default)]
    pub venv_path: String,
}

/// Runtime stage: fresh base, OS runtime dependency, copied artifacts,
/// network contract, entry point.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeStage {
    /// Pinned base image (same interpreter as the build base)
    pub base: String,
    /// Working directory inside the final image
    #[serde(default)]
    pub workdir: String,
    /// OS packages installed into the image
    #[serde(default)]
    pub packages: Vec<String>,
    /// Setup commands; package install and cache purge are one composed
    /// command so the cache never persists in any layer
    #[serde(default)]
    pub setup: Vec<String>,
    /// Process-wide environment, set before the entry point and held for the
    /// process lifetime
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Artifacts copied in: the venv from the build stage, the app from the
    /// build context
    #[serde(default)]
    pub copy: Vec<CopySpec>,
    /// Declared listen ports
    #[serde(default)]
    pub ports: Vec<u16>,
    /// Fixed entry point (exec form)
    #[serde(default)]
    pub command: Vec<String>,
}

/// A copy step; `stage` names a prior build stage for cross-stage transfer,
/// `None` copies from the build context.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CopySpec {
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

impl ImagePlan {
    /// Serialize the plan to YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("failed to serialize plan to YAML")
    }

    /// Serialize the plan to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize plan to JSON")
    }

    /// Validate the plan against the pipeline invariants.
    pub fn validate(&self) -> Result<()> {
        if self.version.is_empty() {
            bail!("plan version cannot be empty");
        }

        let build_base = ImageRef::parse(&self.build.base)
            .with_context(|| format!("build base '{}'", self.build.base))?;
        let runtime_base = ImageRef::parse(&self.runtime.base)
            .with_context(|| format!("runtime base '{}'", self.runtime.base))?;

        if build_base.interpreter_version() != runtime_base.interpreter_version() {
            bail!(
                "interpreter skew between stages: {} vs {}",
                self.build.base,
                self.runtime.base
            );
        }

        self.validate_build()?;
        self.validate_runtime()
    }

    fn validate_build(&self) -> Result<()> {
        if self.build.workdir.is_empty() || !self.build.workdir.starts_with('/') {
            bail!("build workdir must be absolute");
        }
        if self.build.venv_path.is_empty() {
            bail!("build stage must declare a venv path");
        }
        if self.build.context.is_empty() {
            bail!("build stage must copy the dependency manifest into the stage");
        }
        if self.build.commands.is_empty() {
            bail!("build stage has no commands");
        }
        if !self.build.env.contains_key(ENV_NO_BYTECODE) {
            bail!("build stage must set {}", ENV_NO_BYTECODE);
        }

        // The installer upgrade must ride in the same command as the manifest
        // install; a partially-upgraded installer must never resolve only
        // part of the manifest.
        for command in &self.build.commands {
            if command.contains("--upgrade pip") && !command.contains(" -r ") {
                bail!(
                    "installer upgrade must be combined with the manifest install: '{}'",
                    command
                );
            }
        }
        if !self
            .build
            .commands
            .iter()
            .any(|c| c.contains("pip install") && c.contains(" -r "))
        {
            bail!("build stage never installs the dependency manifest");
        }

        Ok(())
    }

    fn validate_runtime(&self) -> Result<()> {
        if self.runtime.workdir.is_empty() || !self.runtime.workdir.starts_with('/') {
            bail!("runtime workdir must be absolute");
        }

        for key in [ENV_NO_BYTECODE, ENV_UNBUFFERED] {
            if !self.runtime.env.contains_key(key) {
                bail!("runtime stage must set {}", key);
            }
        }

        // Package install and index-cache purge must be a single composed
        // command; split across commands the cache would persist in a layer.
        for command in &self.runtime.setup {
            if command.contains("apt-get install") {
                if !command.contains("--no-install-recommends") {
                    bail!("runtime package install must decline recommended extras");
                }
                if !command.contains("rm -rf /var/lib/apt/lists") {
                    bail!("runtime package install must purge the package index cache in the same command");
                }
            }
        }
        // The runtime image always carries an OS-level runtime dependency;
        // a stage that installs nothing is missing it.
        if self.runtime.packages.is_empty() {
            bail!("runtime stage installs no OS packages");
        }
        if self.runtime.setup.is_empty() {
            bail!("runtime packages declared but no setup command installs them");
        }

        if self.runtime.copy.is_empty() {
            bail!("runtime stage copies nothing - no environment, no application");
        }
        let venv_copy = self
            .runtime
            .copy
            .iter()
            .find(|c| c.stage.as_deref() == Some(BUILD_STAGE_NAME));
        match venv_copy {
            Some(copy) if copy.to == self.build.venv_path => {}
            Some(copy) => bail!(
                "cross-stage copy lands at '{}', expected the venv path '{}'",
                copy.to,
                self.build.venv_path
            ),
            None => bail!("runtime stage never imports the build stage's environment"),
        }
        if !self.runtime.copy.iter().any(|c| c.stage.is_none()) {
            bail!("runtime stage never copies the application source tree");
        }
        for (i, copy) in self.runtime.copy.iter().enumerate() {
            if copy.from.is_empty() || copy.to.is_empty() {
                bail!("runtime copy[{}] has an empty path", i);
            }
        }

        match self.runtime.ports.as_slice() {
            [port] if *port > 0 => {}
            [] => bail!("runtime stage declares no listen port"),
            _ => bail!("runtime stage must declare exactly one listen port"),
        }

        if self.runtime.command.is_empty() {
            bail!("runtime stage has no entry point");
        }
        let interpreter = &self.runtime.command[0];
        if !interpreter.starts_with(&self.build.venv_path) {
            bail!(
                "entry point must run the interpreter from the copied environment, got '{}'",
                interpreter
            );
        }
        let bind = format!("0.0.0.0:{}", self.runtime.ports[0]);
        if !self.runtime.command.iter().any(|a| a == &bind) {
            bail!(
                "entry point must bind {} to match the declared port",
                bind
            );
        }

        Ok(())
    }
}

impl fmt::Display for ImagePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Image Plan")?;
        writeln!(f, "==========")?;
        if let Some(ref name) = self.metadata.project_name {
            writeln!(f, "Project:      {}", name)?;
        }
        writeln!(
            f,
            "Dependencies: {} (fingerprint {})",
            self.metadata.dependency_count,
            if self.metadata.manifest_fingerprint.len() > 12 {
                &self.metadata.manifest_fingerprint[..12]
            } else {
                &self.metadata.manifest_fingerprint
            }
        )?;
        writeln!(f)?;

        writeln!(f, "Build Stage:")?;
        writeln!(f, "  Base:  {}", self.build.base)?;
        writeln!(f, "  Venv:  {}/{}", self.build.workdir, self.build.venv_path)?;
        for command in &self.build.commands {
            writeln!(f, "  Run:   {}", command)?;
        }
        writeln!(f)?;

        writeln!(f, "Runtime Stage:")?;
        writeln!(f, "  Base:     {}", self.runtime.base)?;
        if !self.runtime.packages.is_empty() {
            writeln!(f, "  Packages: {}", self.runtime.packages.join(", "))?;
        }
        for copy in &self.runtime.copy {
            match &copy.stage {
                Some(stage) => {
                    writeln!(f, "  Copy:     {} -> {} (from {})", copy.from, copy.to, stage)?
                }
                None => writeln!(f, "  Copy:     {} -> {}", copy.from, copy.to)?,
            }
        }
        let ports: Vec<String> = self.runtime.ports.iter().map(|p| p.to_string()).collect();
        writeln!(f, "  Ports:    {}", ports.join(", "))?;
        writeln!(f, "  Command:  {}", self.runtime.command.join(" "))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_valid_plan() -> ImagePlan {
        let mut build_env = BTreeMap::new();
        build_env.insert(ENV_NO_BYTECODE.to_string(), "1".to_string());

        let mut runtime_env = BTreeMap::new();
        runtime_env.insert(ENV_NO_BYTECODE.to_string(), "1".to_string());
        runtime_env.insert(ENV_UNBUFFERED.to_string(), "1".to_string());

        ImagePlan {
            version: "1".to_string(),
            metadata: PlanMetadata {
                project_name: Some("timetable".to_string()),
                manifest_fingerprint: "abc123".to_string(),
                dependency_count: 2,
            },
            build: BuildStage {
                base: "python:3.11.9-bookworm".to_string(),
                workdir: "/app".to_string(),
                env: build_env,
                context: vec![CopySpec {
                    from: "requirements.txt".to_string(),
                    to: ".".to_string(),
                    stage: None,
                }],
                commands: vec![
                    "python -m venv venv".to_string(),
                    "venv/bin/pip install --no-cache-dir --upgrade pip -r requirements.txt"
                        .to_string(),
                ],
                venv_path: "venv".to_string(),
            },
            runtime: RuntimeStage {
                base: "python:3.11.9-slim-bookworm".to_string(),
                workdir: "/app".to_string(),
                packages: vec!["default-jre-headless".to_string()],
                setup: vec![
                    "apt-get update && apt-get install -y --no-install-recommends \
                     default-jre-headless && rm -rf /var/lib/apt/lists/*"
                        .to_string(),
                ],
                env: runtime_env,
                copy: vec![
                    CopySpec {
                        from: "/app/venv".to_string(),
                        to: "venv".to_string(),
                        stage: Some(BUILD_STAGE_NAME.to_string()),
                    },
                    CopySpec {
                        from: "app".to_string(),
                        to: ".".to_string(),
                        stage: None,
                    },
                ],
                ports: vec![8080],
                command: vec![
                    "venv/bin/python".to_string(),
                    "-m".to_string(),
                    "hypercorn".to_string(),
                    "--bind".to_string(),
                    "0.0.0.0:8080".to_string(),
                    "__init__:app".to_string(),
                ],
            },
        }
    }

    #[test]
    fn test_valid_plan() {
        assert!(minimal_valid_plan().validate().is_ok());
    }

    #[test]
    fn test_floating_base_rejected() {
        let mut plan = minimal_valid_plan();
        plan.runtime.base = "python:latest".to_string();
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_interpreter_skew_rejected() {
        let mut plan = minimal_valid_plan();
        plan.runtime.base = "python:3.12.1-slim-bookworm".to_string();
        let err = plan.validate().unwrap_err().to_string();
        assert!(err.contains("interpreter skew"));
    }

    #[test]
    fn test_split_installer_upgrade_rejected() {
        let mut plan = minimal_valid_plan();
        plan.build.commands = vec![
            "python -m venv venv".to_string(),
            "venv/bin/pip install --upgrade pip".to_string(),
            "venv/bin/pip install -r requirements.txt".to_string(),
        ];
        let err = plan.validate().unwrap_err().to_string();
        assert!(err.contains("combined"));
    }

    #[test]
    fn test_missing_bytecode_flag_rejected() {
        let mut plan = minimal_valid_plan();
        plan.build.env.clear();
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_missing_unbuffered_flag_rejected() {
        let mut plan = minimal_valid_plan();
        plan.runtime.env.remove(ENV_UNBUFFERED);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_apt_without_cache_purge_rejected() {
        let mut plan = minimal_valid_plan();
        plan.runtime.setup = vec![
            "apt-get update && apt-get install -y --no-install-recommends default-jre-headless"
                .to_string(),
        ];
        let err = plan.validate().unwrap_err().to_string();
        assert!(err.contains("purge"));
    }

    #[test]
    fn test_apt_with_recommends_rejected() {
        let mut plan = minimal_valid_plan();
        plan.runtime.setup = vec![
            "apt-get update && apt-get install -y default-jre-headless && \
             rm -rf /var/lib/apt/lists/*"
                .to_string(),
        ];
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_missing_runtime_packages_rejected() {
        let mut plan = minimal_valid_plan();
        plan.runtime.packages.clear();
        plan.runtime.setup.clear();
        let err = plan.validate().unwrap_err().to_string();
        assert!(err.contains("no OS packages"));
    }

    #[test]
    fn test_packages_without_setup_rejected() {
        let mut plan = minimal_valid_plan();
        plan.runtime.setup.clear();
        let err = plan.validate().unwrap_err().to_string();
        assert!(err.contains("no setup command"));
    }

    #[test]
    fn test_missing_venv_import_rejected() {
        let mut plan = minimal_valid_plan();
        plan.runtime.copy.retain(|c| c.stage.is_none());
        let err = plan.validate().unwrap_err().to_string();
        assert!(err.contains("never imports"));
    }

    #[test]
    fn test_missing_app_copy_rejected() {
        let mut plan = minimal_valid_plan();
        plan.runtime.copy.retain(|c| c.stage.is_some());
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_no_port_rejected() {
        let mut plan = minimal_valid_plan();
        plan.runtime.ports.clear();
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_multiple_ports_rejected() {
        let mut plan = minimal_valid_plan();
        plan.runtime.ports = vec![8080, 8443];
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_entry_point_outside_venv_rejected() {
        let mut plan = minimal_valid_plan();
        plan.runtime.command[0] = "/usr/bin/python".to_string();
        let err = plan.validate().unwrap_err().to_string();
        assert!(err.contains("copied environment"));
    }

    #[test]
    fn test_bind_port_mismatch_rejected() {
        let mut plan = minimal_valid_plan();
        plan.runtime.ports = vec![9000];
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let plan = minimal_valid_plan();
        let yaml = plan.to_yaml().unwrap();
        let restored: ImagePlan = serde_yaml::from_str(&yaml).unwrap();
        assert!(restored.validate().is_ok());
        assert_eq!(restored.build.base, plan.build.base);
        assert_eq!(restored.runtime.command, plan.runtime.command);
    }

    #[test]
    fn test_display_summary() {
        let display = minimal_valid_plan().to_string();
        assert!(display.contains("Build Stage:"));
        assert!(display.contains("Runtime Stage:"));
        assert!(display.contains("python:3.11.9-bookworm"));
        assert!(display.contains("Ports:    8080"));
        assert!(display.contains("__init__:app"));
    }
}
