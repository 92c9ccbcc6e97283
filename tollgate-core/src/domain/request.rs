//! Deployment request types

use serde::{Deserialize, Serialize};

use crate::domain::image::ImageRef;

/// A request to deploy a set of images for one commit
///
/// Immutable once created. Images keep their insertion order; a second image
/// with the same `repository:tag` is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    branch: String,
    commit_sha: String,
    requested_tag: String,
    images: Vec<ImageRef>,
}

impl DeploymentRequest {
    pub fn new(
        branch: impl Into<String>,
        commit_sha: impl Into<String>,
        requested_tag: impl Into<String>,
        images: impl IntoIterator<Item = ImageRef>,
    ) -> Self {
        let mut unique: Vec<ImageRef> = Vec::new();
        for image in images {
            if !unique
                .iter()
                .any(|existing| existing.reference() == image.reference())
            {
                unique.push(image);
            }
        }

        Self {
            branch: branch.into(),
            commit_sha: commit_sha.into(),
            requested_tag: requested_tag.into(),
            images: unique,
        }
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn commit_sha(&self) -> &str {
        &self.commit_sha
    }

    pub fn requested_tag(&self) -> &str {
        &self.requested_tag
    }

    pub fn images(&self) -> &[ImageRef] {
        &self.images
    }

    /// Checks the request's shape
    ///
    /// Returns one message per problem; an empty list means the request can
    /// enter the pipeline.
    pub fn shape_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.branch.trim().is_empty() {
            problems.push("branch is empty".to_string());
        }
        if self.images.is_empty() {
            problems.push("no images requested".to_string());
        }
        for image in &self.images {
            if image.repository.trim().is_empty() || image.tag.trim().is_empty() {
                problems.push(format!("image '{}' is incomplete", image));
            }
        }

        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_images_are_dropped() {
        let request = DeploymentRequest::new(
            "main",
            "abc",
            "1",
            vec![
                ImageRef::new("be", "1"),
                ImageRef::new("fe", "1"),
                ImageRef::new("be", "1").with_runtime_user("root"),
            ],
        );

        assert_eq!(request.images().len(), 2);
        assert_eq!(request.images()[0].repository, "be");
        assert_eq!(request.images()[0].runtime_user, None);
        assert_eq!(request.images()[1].repository, "fe");
    }

    #[test]
    fn test_shape_problems() {
        let valid = DeploymentRequest::new("main", "abc", "1", vec![ImageRef::new("be", "1")]);
        assert!(valid.shape_problems().is_empty());

        let empty = DeploymentRequest::new(" ", "abc", "1", Vec::new());
        let problems = empty.shape_problems();
        assert_eq!(problems.len(), 2);
        assert!(problems.contains(&"branch is empty".to_string()));
        assert!(problems.contains(&"no images requested".to_string()));

        let incomplete = DeploymentRequest::new("main", "abc", "1", vec![ImageRef::new("be", "")]);
        assert_eq!(incomplete.shape_problems().len(), 1);
    }
}
