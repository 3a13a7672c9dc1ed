//! The three pipeline phases, executed strictly in order.

use super::{PipelineContext, PipelinePhase};
use crate::manifest::DependencyManifest;
use crate::plan::PlanComposer;
use crate::render::DockerfileRenderer;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Pre-flight checks: the manifest file and the application directory must
/// exist before any image work starts. A missing copy source is fatal here,
/// not halfway through a build.
pub struct ValidateContext;

#[async_trait]
impl PipelinePhase for ValidateContext {
    fn name(&self) -> &'static str {
        "ValidateContext"
    }

    async fn execute(&self, context: &mut PipelineContext) -> Result<()> {
        context
            .config
            .validate()
            .context("pipeline configuration is invalid")?;

        let fs = context.fs.clone();
        if !fs.is_dir(&context.context_dir) {
            bail!(
                "build context {} is not a directory",
                context.context_dir.display()
            );
        }

        let manifest_path = context.context_dir.join(&context.config.manifest_file);
        if !fs.is_file(&manifest_path) {
            bail!("dependency manifest missing: {}", manifest_path.display());
        }

        let app_path = context.context_dir.join(&context.config.app_dir);
        if !fs.is_dir(&app_path) {
            bail!("application directory missing: {}", app_path.display());
        }
        if fs.read_dir(&app_path)?.is_empty() {
            bail!("application directory {} is empty", app_path.display());
        }

        // The import contract (module `__init__`, attribute `app`) is only
        // checked when the container starts; an absent module here is worth a
        // warning but never fails the build.
        if !fs.is_file(&app_path.join("__init__.py")) {
            warn!(
                app = %app_path.display(),
                "application directory has no __init__.py; the ASGI server will fail at startup"
            );
        }

        debug!(context = %context.context_dir.display(), "build context validated");
        Ok(())
    }
}

/// Parse the manifest, compose and validate the plan, render the Dockerfile,
/// and settle the image tag.
pub struct ComposePlan;

#[async_trait]
impl PipelinePhase for ComposePlan {
    fn name(&self) -> &'static str {
        "ComposePlan"
    }

    async fn execute(&self, context: &mut PipelineContext) -> Result<()> {
        let manifest_path = context.context_dir.join(&context.config.manifest_file);
        let manifest = DependencyManifest::load(context.fs.as_ref(), &manifest_path)?;

        let project = context.project_name();
        let plan = PlanComposer::new(&context.config)
            .with_project_name(&project)
            .compose(&manifest)?;

        let dockerfile = DockerfileRenderer::new().render(&plan)?;

        // Fingerprint-derived default tag: an unchanged manifest rebuilds to
        // the same address.
        let tag = context
            .requested_tag
            .clone()
            .unwrap_or_else(|| format!("slipcast/{}:{}", project, manifest.short_fingerprint()));

        info!(
            image = %tag,
            dependencies = manifest.len(),
            "image plan ready"
        );

        context.manifest = Some(manifest);
        context.plan = Some(plan);
        context.dockerfile = Some(dockerfile);
        context.image_tag = Some(tag);
        Ok(())
    }
}

/// Drive `docker build`, feeding the rendered Dockerfile over stdin. A
/// non-zero exit aborts the pipeline; no image is produced and nothing is
/// retried.
pub struct BuildImage;

#[async_trait]
impl PipelinePhase for BuildImage {
    fn name(&self) -> &'static str {
        "BuildImage"
    }

    async fn execute(&self, context: &mut PipelineContext) -> Result<()> {
        let dockerfile = context
            .dockerfile
            .as_ref()
            .context("no Dockerfile rendered")?
            .clone();
        let tag = context.image_tag.as_ref().context("no image tag")?.clone();

        let files = context_file_count(&context.context_dir);
        debug!(files, context = %context.context_dir.display(), "submitting build context");

        let mut child = Command::new(&context.docker_bin)
            .arg("build")
            .arg("-f")
            .arg("-")
            .arg("-t")
            .arg(&tag)
            .arg(&context.context_dir)
            .stdin(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {}", context.docker_bin))?;

        let mut stdin = child.stdin.take().context("no stdin handle on docker build")?;
        stdin
            .write_all(dockerfile.as_bytes())
            .await
            .context("failed to send Dockerfile to docker build")?;
        drop(stdin);

        let status = child
            .wait()
            .await
            .context("failed to wait for docker build")?;

        if !status.success() {
            bail!("docker build failed with {}", status);
        }

        info!(image = %tag, "image built");
        Ok(())
    }
}

/// Count files in the build context the way the builder will see it,
/// honoring gitignore rules.
fn context_file_count(context_dir: &Path) -> usize {
    ignore::WalkBuilder::new(context_dir)
        .hidden(false)
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .count()
}
