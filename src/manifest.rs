//! Dependency manifest parsing
//!
//! The manifest is a `requirements.txt`-style file: one package specifier per
//! line, `#` comments and blank lines ignored, declaration order preserved.
//! It is consumed exclusively by the build stage - the runtime image never
//! contains a copy - so parsing here serves pre-flight validation and the
//! reproducibility fingerprint, not installation itself (the venv's own pip
//! reads the file inside the build stage).

use crate::fs::FileSystem;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("dependency manifest not found: {0}")]
    NotFound(PathBuf),

    #[error("dependency manifest {0} declares no dependencies")]
    Empty(PathBuf),

    #[error("invalid specifier at {path}:{line}: '{text}'")]
    InvalidSpecifier {
        path: PathBuf,
        line: usize,
        text: String,
    },

    #[error("failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },
}

/// A single `name[extras]op version` requirement line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specifier {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
}

/// The parsed dependency manifest.
#[derive(Debug, Clone)]
pub struct DependencyManifest {
    pub path: PathBuf,
    pub specifiers: Vec<Specifier>,
}

fn specifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<name>[A-Za-z0-9][A-Za-z0-9._-]*(?:\[[A-Za-z0-9._,\s-]+\])?)\s*(?P<constraint>(?:===|==|~=|!=|<=|>=|<|>).*)?$",
        )
        .expect("valid regex")
    })
}

impl DependencyManifest {
    /// Load and parse the manifest through the filesystem abstraction.
    pub fn load<F: FileSystem + ?Sized>(fs: &F, path: &Path) -> Result<Self, ManifestError> {
        if !fs.is_file(path) {
            return Err(ManifestError::NotFound(path.to_path_buf()));
        }

        let content = fs.read_to_string(path).map_err(|e| ManifestError::Io {
            path: path.to_path_buf(),
            message: format!("{e:#}"),
        })?;

        Self::parse(path, &content)
    }

    /// Parse manifest content. Fails on the first malformed line; an empty
    /// effective manifest is also an error, since a build stage with nothing
    /// to install almost always means a mis-pointed context.
    pub fn parse(path: &Path, content: &str) -> Result<Self, ManifestError> {
        let mut specifiers = Vec::new();

        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // Strip a trailing inline comment
            let line = line.split(" #").next().unwrap_or(line).trim();

            let caps = specifier_regex().captures(line).ok_or_else(|| {
                ManifestError::InvalidSpecifier {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    text: line.to_string(),
                }
            })?;

            let constraint = caps
                .name("constraint")
                .map(|m| m.as_str().trim().to_string())
                .filter(|c| !c.is_empty());

            // A bare operator with no version is malformed
            if let Some(ref c) = constraint {
                let version = c.trim_start_matches(['=', '~', '!', '<', '>']).trim();
                if version.is_empty() {
                    return Err(ManifestError::InvalidSpecifier {
                        path: path.to_path_buf(),
                        line: idx + 1,
                        text: line.to_string(),
                    });
                }
            }

            specifiers.push(Specifier {
                name: caps["name"].to_string(),
                constraint,
            });
        }

        if specifiers.is_empty() {
            return Err(ManifestError::Empty(path.to_path_buf()));
        }

        debug!(
            manifest = %path.display(),
            dependencies = specifiers.len(),
            "parsed dependency manifest"
        );

        Ok(Self {
            path: path.to_path_buf(),
            specifiers,
        })
    }

    /// SHA-256 over the normalized specifier list.
    ///
    /// Two manifests that declare the same dependencies in the same order
    /// share a fingerprint, which feeds the default image tag: rebuilding
    /// from an unchanged manifest addresses the same artifact.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for spec in &self.specifiers {
            hasher.update(spec.name.to_lowercase().as_bytes());
            if let Some(ref constraint) = spec.constraint {
                hasher.update(constraint.as_bytes());
            }
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }

    /// Truncated fingerprint suitable for an image tag.
    pub fn short_fingerprint(&self) -> String {
        self.fingerprint()[..12].to_string()
    }

    pub fn len(&self) -> usize {
        self.specifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specifiers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;
    use yare::parameterized;

    fn parse(content: &str) -> Result<DependencyManifest, ManifestError> {
        DependencyManifest::parse(Path::new("requirements.txt"), content)
    }

    #[test]
    fn test_parse_typical_manifest() {
        let manifest = parse(
            "# web stack\n\
             quart==0.18.4\n\
             tabula-py==2.7.0\n\
             \n\
             python-dateutil>=2.8\n",
        )
        .unwrap();

        assert_eq!(manifest.len(), 3);
        assert_eq!(manifest.specifiers[0].name, "quart");
        assert_eq!(manifest.specifiers[0].constraint.as_deref(), Some("==0.18.4"));
        assert_eq!(
            manifest.specifiers[2].constraint.as_deref(),
            Some(">=2.8")
        );
    }

    #[test]
    fn test_order_preserved() {
        let manifest = parse("b==1.0\na==1.0\n").unwrap();
        let names: Vec<&str> = manifest.specifiers.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[parameterized(
        unconstrained = { "flask" },
        extras = { "uvicorn[standard]==0.23.2" },
        inline_comment = { "flask==2.0.0  # pinned" },
        compatible_release = { "hypercorn~=0.14" },
    )]
    fn test_accepted_specifiers(line: &str) {
        assert!(parse(line).is_ok());
    }

    #[parameterized(
        bare_operator = { "flask==" },
        leading_dash = { "-r other.txt" },
        option_line = { "--index-url https://example.invalid" },
    )]
    fn test_rejected_specifiers(line: &str) {
        assert!(matches!(
            parse(line),
            Err(ManifestError::InvalidSpecifier { .. })
        ));
    }

    #[test]
    fn test_empty_manifest_rejected() {
        assert!(matches!(
            parse("# comments only\n\n"),
            Err(ManifestError::Empty(_))
        ));
    }

    #[test]
    fn test_fingerprint_stable() {
        let a = parse("flask==2.0.0\nquart==0.18.4\n").unwrap();
        let b = parse("flask==2.0.0\nquart==0.18.4\n").unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.short_fingerprint().len(), 12);
    }

    #[test]
    fn test_fingerprint_changes_with_versions() {
        let a = parse("flask==2.0.0\n").unwrap();
        let b = parse("flask==2.0.1\n").unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_case_insensitive_names() {
        let a = parse("Flask==2.0.0\n").unwrap();
        let b = parse("flask==2.0.0\n").unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_load_through_filesystem() {
        let fs = MockFileSystem::new();
        fs.add_file("requirements.txt", "quart==0.18.4\n");

        let manifest =
            DependencyManifest::load(&fs, Path::new("requirements.txt")).unwrap();
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_load_missing_manifest() {
        let fs = MockFileSystem::new();
        assert!(matches!(
            DependencyManifest::load(&fs, Path::new("requirements.txt")),
            Err(ManifestError::NotFound(_))
        ));
    }
}
