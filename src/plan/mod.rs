//! The image plan: a declarative description of the two-stage build.
//!
//! `schema` holds the serializable plan structures and their invariant
//! checks; `compose` turns a [`crate::config::PipelineConfig`] plus a parsed
//! dependency manifest into the canonical plan.

pub mod compose;
pub mod schema;

pub use compose::PlanComposer;
pub use schema::{BuildStage, CopySpec, ImagePlan, PlanMetadata, RuntimeStage};

/// Name of the build stage as referenced by `COPY --from`.
pub const BUILD_STAGE_NAME: &str = "builder";

/// Suppresses `.pyc` bytecode cache files in both stages.
pub const ENV_NO_BYTECODE: &str = "PYTHONDONTWRITEBYTECODE";

/// Forces unbuffered stdout/stderr so log lines reach the container's log
/// collector immediately.
pub const ENV_UNBUFFERED: &str = "PYTHONUNBUFFERED";
