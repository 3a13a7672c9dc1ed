//! Command handlers
//!
//! Each handler maps an outcome to a process exit code: 0 on success, 1 for
//! pipeline failures, 2 for configuration problems.

use super::commands::{BuildArgs, OutputFormatArg, PlanArgs};
use crate::config::PipelineConfig;
use crate::exec::{docker, PipelineContext, PipelineExecutor};
use crate::fs::RealFileSystem;
use crate::manifest::DependencyManifest;
use crate::plan::PlanComposer;
use crate::render::DockerfileRenderer;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::error;

fn resolve_context(context: &Option<PathBuf>) -> PathBuf {
    context.clone().unwrap_or_else(|| PathBuf::from("."))
}

/// Load and validate the environment configuration, mapping any failure to
/// the configuration exit code.
fn load_config() -> Result<PipelineConfig, i32> {
    let config = PipelineConfig::from_env().map_err(|e| {
        error!("{:#}", e);
        2
    })?;
    config.validate().map_err(|e| {
        error!("{:#}", e);
        2
    })?;
    Ok(config)
}

fn project_name(context_dir: &Path) -> String {
    context_dir
        .canonicalize()
        .unwrap_or_else(|_| context_dir.to_path_buf())
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "app".to_string())
}

pub async fn handle_plan(args: &PlanArgs, quiet: bool) -> i32 {
    let config = match load_config() {
        Ok(config) => config,
        Err(code) => return code,
    };

    match render_plan(&config, args) {
        Ok(output) => {
            if let Some(ref path) = args.output {
                if let Err(e) =
                    std::fs::write(path, &output).context("failed to write output file")
                {
                    error!("{:#}", e);
                    return 1;
                }
                if !quiet {
                    println!("wrote {}", path.display());
                }
            } else {
                print!("{}", output);
            }
            0
        }
        Err(e) => {
            error!("{:#}", e);
            1
        }
    }
}

fn render_plan(config: &PipelineConfig, args: &PlanArgs) -> Result<String> {
    let context_dir = resolve_context(&args.context);
    let fs = RealFileSystem::new();

    let manifest = DependencyManifest::load(&fs, &context_dir.join(&config.manifest_file))?;
    let plan = PlanComposer::new(config)
        .with_project_name(project_name(&context_dir))
        .compose(&manifest)?;

    match args.format {
        OutputFormatArg::Human => Ok(plan.to_string()),
        OutputFormatArg::Json => Ok(plan.to_json()? + "\n"),
        OutputFormatArg::Yaml => plan.to_yaml(),
        OutputFormatArg::Dockerfile => DockerfileRenderer::new().render(&plan),
    }
}

pub async fn handle_build(args: &BuildArgs, quiet: bool) -> i32 {
    let config = match load_config() {
        Ok(config) => config,
        Err(code) => return code,
    };

    let context_dir = resolve_context(&args.context);
    let mut context = PipelineContext::new(config, Arc::new(RealFileSystem::new()), context_dir);
    context.docker_bin = args.docker_bin.clone();
    context.requested_tag = args.tag.clone();

    match PipelineExecutor::new().execute(&mut context).await {
        Ok(report) => {
            if !quiet {
                println!("built {}", report.image_tag);
                println!(
                    "  {} dependencies, manifest fingerprint {}",
                    report.dependency_count,
                    &report.manifest_fingerprint[..12.min(report.manifest_fingerprint.len())]
                );
                println!("  finished in {:.1}s", report.duration.as_secs_f64());
            }
            0
        }
        Err(e) => {
            error!("{:#}", e);
            1
        }
    }
}

pub async fn handle_doctor(quiet: bool) -> i32 {
    match docker::check_docker().await {
        Ok(status) if status.available => {
            if !quiet {
                println!(
                    "docker daemon reachable (api {})",
                    status.api_version.as_deref().unwrap_or("unknown")
                );
            }
            0
        }
        Ok(_) => {
            error!("no reachable docker daemon");
            1
        }
        Err(e) => {
            error!("{:#}", e);
            1
        }
    }
}
