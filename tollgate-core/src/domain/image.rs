//! Image reference types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Tag used when a reference omits one
pub const DEFAULT_TAG: &str = "latest";

/// An image to build and push
///
/// `runtime_user` is the user the container runs as. It may be unknown when
/// the request is created, in which case the builder fills it in after
/// inspecting the built image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub repository: String,
    pub tag: String,
    pub runtime_user: Option<String>,
}

/// Error returned when an image reference cannot be parsed
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid image reference '{input}': {message}")]
pub struct ImageRefParseError {
    pub input: String,
    pub message: String,
}

impl ImageRef {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
            runtime_user: None,
        }
    }

    pub fn with_runtime_user(mut self, user: impl Into<String>) -> Self {
        self.runtime_user = Some(user.into());
        self
    }

    /// Full `repository:tag` reference as understood by the builder
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }

    /// Parses `repository[:tag][=user]`, defaulting the tag to `latest`
    pub fn parse(input: &str) -> Result<Self, ImageRefParseError> {
        Self::parse_with_default_tag(input, DEFAULT_TAG)
    }

    /// Parses `repository[:tag][=user]`
    ///
    /// The tag separator is the last `:` after the last `/`, so registry
    /// ports (`registry:5000/app:1`) are kept in the repository.
    pub fn parse_with_default_tag(
        input: &str,
        default_tag: &str,
    ) -> Result<Self, ImageRefParseError> {
        let err = |message: &str| ImageRefParseError {
            input: input.to_string(),
            message: message.to_string(),
        };

        let (reference, user) = match input.split_once('=') {
            Some((reference, user)) => {
                if user.trim().is_empty() {
                    return Err(err("runtime user after '=' is empty"));
                }
                (reference, Some(user.trim().to_string()))
            }
            None => (input, None),
        };

        let reference = reference.trim();
        let name_start = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (repository, tag) = match reference[name_start..].rfind(':') {
            Some(i) => {
                let split = name_start + i;
                (&reference[..split], &reference[split + 1..])
            }
            None => (reference, default_tag),
        };

        if repository.is_empty() {
            return Err(err("repository is empty"));
        }
        if tag.is_empty() {
            return Err(err("tag is empty"));
        }

        Ok(Self {
            repository: repository.to_string(),
            tag: tag.to_string(),
            runtime_user: user,
        })
    }
}

impl FromStr for ImageRef {
    type Err = ImageRefParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
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

    #[test]
    fn test_parse_repo_and_tag() {
        let image = ImageRef::parse("be:1").unwrap();
        assert_eq!(image.repository, "be");
        assert_eq!(image.tag, "1");
        assert_eq!(image.runtime_user, None);
    }

    #[test]
    fn test_parse_with_user() {
        let image = ImageRef::parse("ghcr.io/acme/fe:2.0=nextjs").unwrap();
        assert_eq!(image.repository, "ghcr.io/acme/fe");
        assert_eq!(image.tag, "2.0");
        assert_eq!(image.runtime_user.as_deref(), Some("nextjs"));
    }

    #[test]
    fn test_parse_registry_port_without_tag() {
        let image = ImageRef::parse("registry:5000/app").unwrap();
        assert_eq!(image.repository, "registry:5000/app");
        assert_eq!(image.tag, DEFAULT_TAG);
    }

    #[test]
    fn test_parse_with_default_tag() {
        let image = ImageRef::parse_with_default_tag("be=node", "abc1234").unwrap();
        assert_eq!(image.tag, "abc1234");
        assert_eq!(image.runtime_user.as_deref(), Some("node"));

        let explicit = ImageRef::parse_with_default_tag("be:1", "abc1234").unwrap();
        assert_eq!(explicit.tag, "1");
    }

    #[test]
    fn test_parse_errors() {
        assert!(ImageRef::parse(":1").is_err());
        assert!(ImageRef::parse("be:").is_err());
        assert!(ImageRef::parse("be:1=").is_err());
    }

    #[test]
    fn test_reference() {
        assert_eq!(ImageRef::new("be", "1").reference(), "be:1");
    }
}
