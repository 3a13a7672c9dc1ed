//! Dockerfile rendering
//!
//! Renders a validated [`ImagePlan`] into a multi-stage Dockerfile. Output is
//! deterministic: env maps are ordered, and the same plan always produces the
//! same bytes, so unchanged inputs hit the builder's layer cache end to end.

use crate::plan::{ImagePlan, BUILD_STAGE_NAME};
use anyhow::{Context, Result};
use std::io::Write;

pub struct DockerfileRenderer;

impl DockerfileRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Render the plan as a Dockerfile string.
    pub fn render(&self, plan: &ImagePlan) -> Result<String> {
        let mut buffer = Vec::new();
        self.write_definition(plan, &mut buffer)?;
        String::from_utf8(buffer).context("rendered Dockerfile is not valid UTF-8")
    }

    /// Write the two-stage definition:
    ///
    /// Stage 1 (`builder`) creates the venv and installs the manifest into
    /// it. Stage 2 starts from the fresh runtime base, installs OS packages
    /// with the cache purged in the same layer, imports the venv and the
    /// application tree, declares the port, and fixes the entry point.
    pub fn write_definition<W: Write>(&self, plan: &ImagePlan, mut writer: W) -> Result<()> {
        plan.validate().context("refusing to render an invalid plan")?;

        writeln!(writer, "# syntax=docker/dockerfile:1")?;
        writeln!(writer)?;

        // Stage 1: build
        writeln!(writer, "FROM {} AS {}", plan.build.base, BUILD_STAGE_NAME)?;
        writeln!(writer, "WORKDIR {}", plan.build.workdir)?;
        Self::write_env(&mut writer, &plan.build.env)?;
        for copy in &plan.build.context {
            writeln!(writer, "COPY {} {}", copy.from, copy.to)?;
        }
        for command in &plan.build.commands {
            writeln!(writer, "RUN {}", command)?;
        }
        writeln!(writer)?;

        // Stage 2: runtime, from a fresh base - only the venv crosses over
        writeln!(writer, "FROM {}", plan.runtime.base)?;
        writeln!(writer, "WORKDIR {}", plan.runtime.workdir)?;
        Self::write_env(&mut writer, &plan.runtime.env)?;
        for command in &plan.runtime.setup {
            writeln!(writer, "RUN {}", command)?;
        }
        for copy in &plan.runtime.copy {
            match &copy.stage {
                Some(stage) => {
                    writeln!(writer, "COPY --from={} {} {}", stage, copy.from, copy.to)?
                }
                None => writeln!(writer, "COPY {} {}", copy.from, copy.to)?,
            }
        }
        for port in &plan.runtime.ports {
            writeln!(writer, "EXPOSE {}", port)?;
        }
        let command =
            serde_json::to_string(&plan.runtime.command).context("failed to encode CMD")?;
        writeln!(writer, "CMD {}", command)?;

        Ok(())
    }

    fn write_env<W: Write>(
        writer: &mut W,
        env: &std::collections::BTreeMap<String, String>,
    ) -> Result<()> {
        if env.is_empty() {
            return Ok(());
        }
        let pairs: Vec<String> = env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        writeln!(writer, "ENV {}", pairs.join(" "))?;
        Ok(())
    }
}

impl Default for DockerfileRenderer {
    fn default() -> Self {
        Self::new()
    }
}
