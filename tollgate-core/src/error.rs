//! Error types for deployment runs

use thiserror::Error;

use crate::domain::pipeline::PipelineState;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that end a deployment run, or prevent one from starting
///
/// Messages reference secrets by name only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// A required secret could not be resolved
    #[error("Secret not found: {0}")]
    SecretNotFound(String),

    /// Request failed shape validation
    #[error("Invalid request: {}", .0.join("; "))]
    InvalidRequest(Vec<String>),

    /// One or more image builds failed
    #[error("Build failed for: {}", .repositories.join(", "))]
    BuildFailed {
        /// Repositories whose build failed
        repositories: Vec<String>,
    },

    /// The secret scanner could not produce a result
    #[error("Secret scan unavailable: {0}")]
    ScanUnavailable(String),

    /// The policy gate denied the deployment
    #[error("Policy violation: {}", .0.join(", "))]
    PolicyViolation(Vec<String>),

    /// One or more pushes failed
    #[error("Push failed for: {}", .repositories.join(", "))]
    PushFailed {
        /// Repositories whose push failed
        repositories: Vec<String>,
        /// Subset of those that failed on registry authentication
        auth_failed: Vec<String>,
    },

    /// Registry rejected the credentials for every failed push
    #[error("Registry authentication failed for: {}", .repositories.join(", "))]
    AuthFailed {
        /// Repositories whose push was refused
        repositories: Vec<String>,
    },

    /// An operation exceeded its time limit
    #[error("Timed out during {stage}")]
    Timeout {
        /// Stage name (build, scan, push)
        stage: String,
    },

    /// Another run holds the pipeline
    #[error("Pipeline is busy with another run")]
    PipelineBusy,

    /// The run was cancelled between states
    #[error("Run cancelled")]
    Cancelled,

    /// The audit log could not be written
    #[error("Audit log error: {0}")]
    Audit(String),

    /// The state machine was asked to take an edge it does not have
    #[error("Illegal transition {from} -> {to}")]
    IllegalTransition {
        from: PipelineState,
        to: PipelineState,
    },
}

impl PipelineError {
    /// Reason strings recorded on the failed run
    pub fn reasons(&self) -> Vec<String> {
        match self {
            PipelineError::SecretNotFound(name) => vec![format!("secret-not-found:{}", name)],
            PipelineError::InvalidRequest(_) => vec!["invalid-request".to_string()],
            PipelineError::BuildFailed { repositories } => repositories
                .iter()
                .map(|r| format!("build-failed:{}", r))
                .collect(),
            PipelineError::ScanUnavailable(_) => vec!["scan-unavailable".to_string()],
            PipelineError::PolicyViolation(reasons) => reasons.clone(),
            PipelineError::PushFailed {
                repositories,
                auth_failed,
            } => repositories
                .iter()
                .map(|r| {
                    if auth_failed.contains(r) {
                        format!("auth-failed:{}", r)
                    } else {
                        format!("push-failed:{}", r)
                    }
                })
                .collect(),
            PipelineError::AuthFailed { repositories } => repositories
                .iter()
                .map(|r| format!("auth-failed:{}", r))
                .collect(),
            PipelineError::Timeout { stage } => vec![format!("timeout:{}", stage)],
            PipelineError::PipelineBusy => vec!["pipeline-busy".to_string()],
            PipelineError::Cancelled => vec!["cancelled".to_string()],
            PipelineError::Audit(_) => vec!["audit-unavailable".to_string()],
            PipelineError::IllegalTransition { from, to } => {
                vec![format!("illegal-transition:{}->{}", from, to)]
            }
        }
    }

    /// Check if this error means the run never started
    pub fn is_busy(&self) -> bool {
        matches!(self, PipelineError::PipelineBusy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasons() {
        assert_eq!(
            PipelineError::InvalidRequest(vec!["branch is empty".into()]).reasons(),
            vec!["invalid-request"]
        );
        assert_eq!(
            PipelineError::BuildFailed {
                repositories: vec!["be".into(), "fe".into()]
            }
            .reasons(),
            vec!["build-failed:be", "build-failed:fe"]
        );
        assert_eq!(
            PipelineError::PushFailed {
                repositories: vec!["be".into(), "fe".into()],
                auth_failed: vec!["be".into()],
            }
            .reasons(),
            vec!["auth-failed:be", "push-failed:fe"]
        );
        assert_eq!(
            PipelineError::Timeout {
                stage: "scan".into()
            }
            .reasons(),
            vec!["timeout:scan"]
        );
        assert_eq!(
            PipelineError::IllegalTransition {
                from: PipelineState::Pending,
                to: PipelineState::Completed,
            }
            .reasons(),
            vec!["illegal-transition:pending->completed"]
        );
    }

    #[test]
    fn test_policy_violation_keeps_every_reason() {
        let reasons = vec![
            "branch-not-main".to_string(),
            "runtime-user-is-root:be".to_string(),
            "secret-scan-failed:2".to_string(),
        ];
        let err = PipelineError::PolicyViolation(reasons.clone());
        assert_eq!(err.reasons(), reasons);
        assert!(err.to_string().contains("runtime-user-is-root:be"));
    }
}
