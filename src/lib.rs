//! slipcast - two-stage container build pipeline for Python ASGI services
//!
//! This library models the packaging of a Python web service as an explicit,
//! validated pipeline: a **build stage** that installs a dependency manifest
//! into an isolated virtualenv, and a **runtime stage** that assembles a
//! minimal image from a fresh pinned base, the copied venv, the application
//! source tree, a headless JVM, and a fixed ASGI entry point on port 8080.
//!
//! # Core Concepts
//!
//! - **Image Plan**: a serializable description of both stages, validated
//!   against the pipeline invariants (pinned bases, matching interpreter
//!   versions, combined install commands, cache-free layers)
//! - **Composition**: pure construction of the canonical plan from
//!   configuration plus a parsed dependency manifest
//! - **Rendering**: deterministic translation of a plan into a multi-stage
//!   Dockerfile
//! - **Execution**: a strictly sequential, fail-fast run of the pipeline
//!   phases driving `docker build`
//!
//! # Example Usage
//!
//! ```no_run
//! use slipcast::{DependencyManifest, DockerfileRenderer, PipelineConfig, PlanComposer};
//! use slipcast::fs::RealFileSystem;
//! use std::path::Path;
//!
//! fn render(context: &Path) -> anyhow::Result<String> {
//!     let config = PipelineConfig::from_env()?;
//!     config.validate()?;
//!
//!     let fs = RealFileSystem::new();
//!     let manifest = DependencyManifest::load(&fs, &context.join(&config.manifest_file))?;
//!     let plan = PlanComposer::new(&config).compose(&manifest)?;
//!
//!     DockerfileRenderer::new().render(&plan)
//! }
//! ```

pub mod cli;
pub mod config;
pub mod exec;
pub mod fs;
pub mod image;
pub mod manifest;
pub mod plan;
pub mod render;

pub use config::{ConfigError, PipelineConfig};
pub use exec::{BuildReport, PipelineContext, PipelineExecutor, PipelinePhase};
pub use image::{ImageRef, ImageRefError};
pub use manifest::{DependencyManifest, ManifestError, Specifier};
pub use plan::{ImagePlan, PlanComposer};
pub use render::DockerfileRenderer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
