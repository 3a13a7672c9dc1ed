//! Configuration management for slipcast
//!
//! Pipeline settings are loaded with `from_env()` from environment variables
//! with sensible defaults, then validated once before any stage runs.
//! Everything the two stages depend on - base images, working directory, venv
//! location, manifest and app paths, listen port, entry point - lives here as
//! an explicit struct consumed at startup rather than ambient state queried
//! mid-build. A malformed value is a startup error, never a silent fallback.
//!
//! # Environment Variables
//!
//! - `SLIPCAST_BUILD_BASE`: build-stage base image - default: "python:3.11.9-bookworm"
//! - `SLIPCAST_RUNTIME_BASE`: runtime-stage base image - default: "python:3.11.9-slim-bookworm"
//! - `SLIPCAST_WORKDIR`: in-image working directory - default: "/app"
//! - `SLIPCAST_VENV_DIR`: venv subpath under the workdir - default: "venv"
//! - `SLIPCAST_MANIFEST`: dependency manifest filename - default: "requirements.txt"
//! - `SLIPCAST_APP_DIR`: application subdirectory of the context - default: "app"
//! - `SLIPCAST_PORT`: declared listen port - default: "8080"
//! - `SLIPCAST_ASGI_MODULE`: ASGI server module - default: "hypercorn"
//! - `SLIPCAST_APP_TARGET`: application target - default: "__init__:app"
//! - `SLIPCAST_RUNTIME_PACKAGES`: comma-separated OS packages - default: "default-jre-headless"
//! - `SLIPCAST_LOG_LEVEL`: logging level - default: "info"

use crate::image::{ImageRef, ImageRefError};
use std::env;
use thiserror::Error;

const DEFAULT_BUILD_BASE: &str = "python:3.11.9-bookworm";
const DEFAULT_RUNTIME_BASE: &str = "python:3.11.9-slim-bookworm";
const DEFAULT_WORKDIR: &str = "/app";
const DEFAULT_VENV_DIR: &str = "venv";
const DEFAULT_MANIFEST_FILE: &str = "requirements.txt";
const DEFAULT_APP_DIR: &str = "app";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_ASGI_MODULE: &str = "hypercorn";
const DEFAULT_APP_TARGET: &str = "__init__:app";
const DEFAULT_RUNTIME_PACKAGES: &str = "default-jre-headless";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One of the base image references is unusable
    #[error("invalid {which} base image: {source}")]
    InvalidImage {
        which: &'static str,
        #[source]
        source: ImageRefError,
    },

    /// Build and runtime bases carry different interpreter versions
    #[error("interpreter skew: build base is {build}, runtime base is {runtime}")]
    InterpreterSkew { build: String, runtime: String },

    /// Failed to parse a configuration value
    #[error("failed to parse {field}: {error}")]
    ParseError { field: String, error: String },

    /// Configuration validation failed
    #[error("configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Main configuration structure for slipcast
///
/// Constructed with `from_env()`, which reads `SLIPCAST_*` environment
/// variables and falls back to the defaults above. `Default::default()`
/// yields the documented defaults without consulting the environment.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Build-stage base image (pinned)
    pub build_base: String,

    /// Runtime-stage base image (pinned, same interpreter as the build base)
    pub runtime_base: String,

    /// Working directory inside both stages
    pub workdir: String,

    /// Venv subpath under the workdir
    pub venv_dir: String,

    /// Dependency manifest filename in the build context
    pub manifest_file: String,

    /// Application subdirectory of the build context
    pub app_dir: String,

    /// TCP port the image declares and the entry point binds
    pub port: u16,

    /// ASGI server module executed via `python -m`
    pub asgi_module: String,

    /// Application target in `module:attribute` form
    pub app_target: String,

    /// OS packages installed into the runtime stage
    pub runtime_packages: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            build_base: DEFAULT_BUILD_BASE.to_string(),
            runtime_base: DEFAULT_RUNTIME_BASE.to_string(),
            workdir: DEFAULT_WORKDIR.to_string(),
            venv_dir: DEFAULT_VENV_DIR.to_string(),
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
            app_dir: DEFAULT_APP_DIR.to_string(),
            port: DEFAULT_PORT,
            asgi_module: DEFAULT_ASGI_MODULE.to_string(),
            app_target: DEFAULT_APP_TARGET.to_string(),
            runtime_packages: vec![DEFAULT_RUNTIME_PACKAGES.to_string()],
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl PipelineConfig {
    /// Load the configuration from `SLIPCAST_*` environment variables,
    /// falling back to the defaults above.
    ///
    /// A value that is present but unparsable aborts configuration loading;
    /// a typo must never degrade into a default-configured build.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var("SLIPCAST_PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|e| ConfigError::ParseError {
                field: "SLIPCAST_PORT".to_string(),
                error: format!("'{}': {}", raw, e),
            })?,
            Err(_) => DEFAULT_PORT,
        };

        let runtime_packages = env::var("SLIPCAST_RUNTIME_PACKAGES")
            .unwrap_or_else(|_| DEFAULT_RUNTIME_PACKAGES.to_string())
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        Ok(Self {
            build_base: env_or("SLIPCAST_BUILD_BASE", DEFAULT_BUILD_BASE),
            runtime_base: env_or("SLIPCAST_RUNTIME_BASE", DEFAULT_RUNTIME_BASE),
            workdir: env_or("SLIPCAST_WORKDIR", DEFAULT_WORKDIR),
            venv_dir: env_or("SLIPCAST_VENV_DIR", DEFAULT_VENV_DIR),
            manifest_file: env_or("SLIPCAST_MANIFEST", DEFAULT_MANIFEST_FILE),
            app_dir: env_or("SLIPCAST_APP_DIR", DEFAULT_APP_DIR),
            port,
            asgi_module: env_or("SLIPCAST_ASGI_MODULE", DEFAULT_ASGI_MODULE),
            app_target: env_or("SLIPCAST_APP_TARGET", DEFAULT_APP_TARGET),
            runtime_packages,
        })
    }

    /// Validate the configuration before any stage runs.
    ///
    /// Checks the pinned-base invariant, the interpreter-version match
    /// between the two stages, and the shape of the entry-point contract.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let build = ImageRef::parse(&self.build_base).map_err(|source| {
            ConfigError::InvalidImage {
                which: "build",
                source,
            }
        })?;
        let runtime = ImageRef::parse(&self.runtime_base).map_err(|source| {
            ConfigError::InvalidImage {
                which: "runtime",
                source,
            }
        })?;

        if build.interpreter_version() != runtime.interpreter_version() {
            return Err(ConfigError::InterpreterSkew {
                build: self.build_base.clone(),
                runtime: self.runtime_base.clone(),
            });
        }

        if self.port == 0 {
            return Err(ConfigError::ValidationFailed(
                "port must be non-zero".to_string(),
            ));
        }

        // The runtime image carries an OS-level runtime dependency; a
        // configuration that installs nothing produces an image that cannot
        // serve its workload.
        if self.runtime_packages.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one runtime OS package must be installed".to_string(),
            ));
        }

        if !self.workdir.starts_with('/') {
            return Err(ConfigError::ValidationFailed(format!(
                "workdir must be absolute, got '{}'",
                self.workdir
            )));
        }

        if self.venv_dir.is_empty() || self.venv_dir.starts_with('/') {
            return Err(ConfigError::ValidationFailed(format!(
                "venv dir must be a relative subpath, got '{}'",
                self.venv_dir
            )));
        }

        match self.app_target.split_once(':') {
            Some((module, attr)) if !module.is_empty() && !attr.is_empty() => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "app target must be 'module:attribute', got '{}'",
                    self.app_target
                )));
            }
        }

        if self.asgi_module.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "ASGI server module cannot be empty".to_string(),
            ));
        }

        if self.manifest_file.is_empty() || self.app_dir.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "manifest filename and app directory cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// The entry-point bind address (`0.0.0.0:8080` by default).
    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    /// Path of the venv interpreter relative to the workdir.
    pub fn venv_python(&self) -> String {
        format!("{}/bin/python", self.venv_dir)
    }
}
