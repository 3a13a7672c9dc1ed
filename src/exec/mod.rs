//! Pipeline execution
//!
//! The pipeline is strictly sequential: each phase fully completes before the
//! next begins, any failure aborts the run with no partial artifact, and
//! nothing is retried at this layer - recovery belongs to whatever invoked
//! the build.

pub mod docker;
mod phases;

pub use phases::{BuildImage, ComposePlan, ValidateContext};

use crate::config::PipelineConfig;
use crate::fs::FileSystem;
use crate::manifest::DependencyManifest;
use crate::plan::ImagePlan;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Shared state threaded through the phases.
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub fs: Arc<dyn FileSystem>,
    /// Build context directory on the host
    pub context_dir: PathBuf,
    /// Docker binary used to drive the build
    pub docker_bin: String,
    /// Explicit image tag; defaults to a fingerprint-derived tag
    pub requested_tag: Option<String>,

    // Populated as phases run
    pub manifest: Option<DependencyManifest>,
    pub plan: Option<ImagePlan>,
    pub dockerfile: Option<String>,
    pub image_tag: Option<String>,
}

impl PipelineContext {
    pub fn new(config: PipelineConfig, fs: Arc<dyn FileSystem>, context_dir: PathBuf) -> Self {
        Self {
            config,
            fs,
            context_dir,
            docker_bin: "docker".to_string(),
            requested_tag: None,
            manifest: None,
            plan: None,
            dockerfile: None,
            image_tag: None,
        }
    }

    /// Project name derived from the context directory.
    pub fn project_name(&self) -> String {
        self.context_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty() && n != ".")
            .unwrap_or_else(|| "app".to_string())
    }
}

/// One sequential step of the pipeline.
#[async_trait]
pub trait PipelinePhase: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, context: &mut PipelineContext) -> Result<()>;
}

/// Outcome of a completed pipeline run.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub image_tag: String,
    pub manifest_fingerprint: String,
    pub dependency_count: usize,
    pub duration: Duration,
}

pub struct PipelineExecutor {
    phases: Vec<Box<dyn PipelinePhase>>,
}

impl PipelineExecutor {
    /// The full pipeline: validate, compose, build.
    pub fn new() -> Self {
        Self {
            phases: vec![
                Box::new(ValidateContext),
                Box::new(ComposePlan),
                Box::new(BuildImage),
            ],
        }
    }

    /// A pipeline with explicit phases (used to stop short of the docker
    /// invocation in tests).
    pub fn with_phases(phases: Vec<Box<dyn PipelinePhase>>) -> Self {
        Self { phases }
    }

    /// Run every phase in order; the first failure aborts the run.
    pub async fn execute(&self, context: &mut PipelineContext) -> Result<BuildReport> {
        let start = Instant::now();
        info!(
            context = %context.context_dir.display(),
            "starting pipeline"
        );

        for phase in &self.phases {
            let phase_start = Instant::now();
            info!(phase = phase.name(), "phase started");

            phase
                .execute(context)
                .await
                .with_context(|| format!("phase {} failed", phase.name()))?;

            debug!(
                phase = phase.name(),
                elapsed_ms = phase_start.elapsed().as_millis() as u64,
                "phase complete"
            );
        }

        let plan = context
            .plan
            .as_ref()
            .context("pipeline finished without composing a plan")?;
        let report = BuildReport {
            image_tag: context
                .image_tag
                .clone()
                .context("pipeline finished without an image tag")?,
            manifest_fingerprint: plan.metadata.manifest_fingerprint.clone(),
            dependency_count: plan.metadata.dependency_count,
            duration: start.elapsed(),
        };

        info!(
            image = %report.image_tag,
            elapsed_ms = report.duration.as_millis() as u64,
            "pipeline complete"
        );
        Ok(report)
    }
}

impl Default for PipelineExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;

    fn test_context() -> PipelineContext {
        let fs = MockFileSystem::new();
        fs.add_file("/ctx/requirements.txt", "quart==0.18.4\n");
        fs.add_file("/ctx/app/__init__.py", "app = None\n");

        let config = PipelineConfig {
            build_base: "python:3.11.9-bookworm".to_string(),
            runtime_base: "python:3.11.9-slim-bookworm".to_string(),
            workdir: "/app".to_string(),
            venv_dir: "venv".to_string(),
            manifest_file: "requirements.txt".to_string(),
            app_dir: "app".to_string(),
            port: 8080,
            asgi_module: "hypercorn".to_string(),
            app_target: "__init__:app".to_string(),
            runtime_packages: vec!["default-jre-headless".to_string()],
        };
        PipelineContext::new(config, Arc::new(fs), PathBuf::from("/ctx"))
    }

    #[tokio::test]
    async fn test_validate_and_compose_sequence() {
        let executor = PipelineExecutor::with_phases(vec![
            Box::new(ValidateContext),
            Box::new(ComposePlan),
        ]);
        let mut context = test_context();

        let report = executor.execute(&mut context).await.unwrap();
        assert!(context.plan.is_some());
        assert!(context.dockerfile.is_some());
        assert_eq!(report.dependency_count, 1);
        assert!(report.image_tag.starts_with("slipcast/ctx:"));
    }

    #[tokio::test]
    async fn test_failure_stops_pipeline() {
        let executor = PipelineExecutor::with_phases(vec![
            Box::new(ValidateContext),
            Box::new(ComposePlan),
        ]);
        let mut context = test_context();
        context.config.manifest_file = "missing.txt".to_string();

        let err = executor.execute(&mut context).await.unwrap_err();
        assert!(err.to_string().contains("ValidateContext"));
        // Nothing downstream ran
        assert!(context.plan.is_none());
    }

    #[tokio::test]
    async fn test_requested_tag_wins() {
        let executor = PipelineExecutor::with_phases(vec![
            Box::new(ValidateContext),
            Box::new(ComposePlan),
        ]);
        let mut context = test_context();
        context.requested_tag = Some("registry.local:5000/timetable:1.0".to_string());

        let report = executor.execute(&mut context).await.unwrap();
        assert_eq!(report.image_tag, "registry.local:5000/timetable:1.0");
    }

    #[test]
    fn test_project_name_from_context_dir() {
        let context = test_context();
        assert_eq!(context.project_name(), "ctx");
    }
}
