//! Base image references
//!
//! Both pipeline stages start from a pinned interpreter image. A floating tag
//! (or no tag at all) makes rebuilds non-reproducible, so parsing rejects
//! anything that does not carry an exact dotted version.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageRefError {
    #[error("image reference is empty")]
    Empty,

    #[error("image reference '{0}' has no tag - pin an exact version")]
    MissingTag(String),

    #[error("image reference '{0}' uses a floating tag - pin an exact version")]
    FloatingTag(String),
}

/// A parsed, pinned `repository:tag` image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub repository: String,
    pub tag: String,
}

impl ImageRef {
    /// Parse a reference, enforcing the pinned-tag invariant.
    ///
    /// A tag is considered pinned when it starts with a dotted numeric
    /// version (`3.11.9`, `3.11.9-slim-bookworm`). `latest` and bare names
    /// are rejected.
    pub fn parse(reference: &str) -> Result<Self, ImageRefError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ImageRefError::Empty);
        }

        // The last colon separates the tag; earlier colons may belong to a
        // registry host:port prefix.
        let (repository, tag) = match reference.rsplit_once(':') {
            Some((repo, tag)) if !tag.contains('/') => (repo, tag),
            _ => return Err(ImageRefError::MissingTag(reference.to_string())),
        };

        if repository.is_empty() || tag.is_empty() {
            return Err(ImageRefError::MissingTag(reference.to_string()));
        }

        if Self::version_prefix(tag).is_none() {
            return Err(ImageRefError::FloatingTag(reference.to_string()));
        }

        Ok(Self {
            repository: repository.to_string(),
            tag: tag.to_string(),
        })
    }

    /// The interpreter version embedded in the tag (`3.11.9` out of
    /// `3.11.9-slim-bookworm`). Used to detect ABI skew between the build
    /// and runtime bases.
    pub fn interpreter_version(&self) -> &str {
        // parse() guarantees the prefix exists
        Self::version_prefix(&self.tag).unwrap_or(&self.tag)
    }

    fn version_prefix(tag: &str) -> Option<&str> {
        let end = tag
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(tag.len());
        let prefix = &tag[..end];
        if prefix.contains('.') && !prefix.starts_with('.') && !prefix.ends_with('.') {
            Some(prefix)
        } else {
            None
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[test]
    fn test_parse_pinned_reference() {
        let image = ImageRef::parse("python:3.11.9-slim-bookworm").unwrap();
        assert_eq!(image.repository, "python");
        assert_eq!(image.tag, "3.11.9-slim-bookworm");
        assert_eq!(image.interpreter_version(), "3.11.9");
    }

    #[test]
    fn test_parse_registry_with_port() {
        let image = ImageRef::parse("registry.local:5000/python:3.11.9").unwrap();
        assert_eq!(image.repository, "registry.local:5000/python");
        assert_eq!(image.tag, "3.11.9");
    }

    #[parameterized(
        latest = { "python:latest" },
        bare_word = { "python:bookworm" },
        no_dots = { "python:3" },
    )]
    fn test_floating_tags_rejected(reference: &str) {
        assert!(matches!(
            ImageRef::parse(reference),
            Err(ImageRefError::FloatingTag(_))
        ));
    }

    #[parameterized(
        no_tag = { "python" },
        trailing_colon = { "python:" },
        slash_after_colon = { "registry.local:5000/python" },
    )]
    fn test_missing_tag_rejected(reference: &str) {
        assert!(matches!(
            ImageRef::parse(reference),
            Err(ImageRefError::MissingTag(_))
        ));
    }

    #[test]
    fn test_empty_reference() {
        assert_eq!(ImageRef::parse("  "), Err(ImageRefError::Empty));
    }

    #[test]
    fn test_display_round_trip() {
        let image = ImageRef::parse("python:3.11.9-bookworm").unwrap();
        assert_eq!(image.to_string(), "python:3.11.9-bookworm");
    }

    #[test]
    fn test_two_component_version_is_pinned() {
        let image = ImageRef::parse("python:3.11-slim").unwrap();
        assert_eq!(image.interpreter_version(), "3.11");
    }
}
