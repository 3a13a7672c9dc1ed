//! Plan composition
//!
//! Turns the pipeline configuration plus a parsed dependency manifest into
//! the canonical two-stage plan. Composition is pure - no filesystem or
//! network access - so the same inputs always yield the same plan.

use super::schema::{BuildStage, CopySpec, ImagePlan, PlanMetadata, RuntimeStage};
use super::{BUILD_STAGE_NAME, ENV_NO_BYTECODE, ENV_UNBUFFERED};
use crate::config::PipelineConfig;
use crate::manifest::DependencyManifest;
use anyhow::Result;
use std::collections::BTreeMap;
use tracing::debug;

pub struct PlanComposer<'a> {
    config: &'a PipelineConfig,
    project_name: Option<String>,
}

impl<'a> PlanComposer<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self {
            config,
            project_name: None,
        }
    }

    pub fn with_project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = Some(name.into());
        self
    }

    /// Compose and validate the plan.
    pub fn compose(&self, manifest: &DependencyManifest) -> Result<ImagePlan> {
        let plan = ImagePlan {
            version: "1".to_string(),
            metadata: PlanMetadata {
                project_name: self.project_name.clone(),
                manifest_fingerprint: manifest.fingerprint(),
                dependency_count: manifest.len(),
            },
            build: self.build_stage(),
            runtime: self.runtime_stage(),
        };

        plan.validate()?;
        debug!(
            dependencies = manifest.len(),
            fingerprint = %manifest.short_fingerprint(),
            "composed image plan"
        );
        Ok(plan)
    }

    fn build_stage(&self) -> BuildStage {
        let config = self.config;

        let mut env = BTreeMap::new();
        env.insert(ENV_NO_BYTECODE.to_string(), "1".to_string());

        BuildStage {
            base: config.build_base.clone(),
            workdir: config.workdir.clone(),
            env,
            context: vec![CopySpec {
                from: config.manifest_file.clone(),
                to: ".".to_string(),
                stage: None,
            }],
            commands: vec![
                format!("python -m venv {}", config.venv_dir),
                // Installer upgrade and manifest install are one command so
                // every package resolves under the same installer version.
                format!(
                    "{}/bin/pip install --no-cache-dir --upgrade pip -r {}",
                    config.venv_dir, config.manifest_file
                ),
            ],
            venv_path: config.venv_dir.clone(),
        }
    }

    fn runtime_stage(&self) -> RuntimeStage {
        let config = self.config;

        let mut env = BTreeMap::new();
        env.insert(ENV_NO_BYTECODE.to_string(), "1".to_string());
        env.insert(ENV_UNBUFFERED.to_string(), "1".to_string());

        // Index refresh, headless install, and cache purge as one composed
        // command - the cache must not survive into any layer. An empty
        // package list is not special-cased: validation rejects the plan.
        let setup = vec![format!(
            "apt-get update && apt-get install -y --no-install-recommends {} && \
             rm -rf /var/lib/apt/lists/*",
            config.runtime_packages.join(" ")
        )];

        RuntimeStage {
            base: config.runtime_base.clone(),
            workdir: config.workdir.clone(),
            packages: config.runtime_packages.clone(),
            setup,
            env,
            copy: vec![
                CopySpec {
                    from: format!("{}/{}", config.workdir, config.venv_dir),
                    to: config.venv_dir.clone(),
                    stage: Some(BUILD_STAGE_NAME.to_string()),
                },
                CopySpec {
                    from: config.app_dir.clone(),
                    to: ".".to_string(),
                    stage: None,
                },
            ],
            ports: vec![config.port],
            command: vec![
                config.venv_python(),
                "-m".to_string(),
                config.asgi_module.clone(),
                "--bind".to_string(),
                config.bind_address(),
                config.app_target.clone(),
            ],
        }
    }
}
