//! Build and push result types

use serde::{Deserialize, Serialize};

/// Result of building one image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    pub success: bool,
    pub sha256: String,
    /// Where the builder's output can be found (file path or builder log id)
    pub log_ref: Option<String>,
    /// User configured in the built image, when the builder reports it
    pub runtime_user: Option<String>,
}

/// Result of pushing one image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResult {
    pub repository: String,
    pub tag: String,
    pub success: bool,
    pub digest: Option<String>,
}
