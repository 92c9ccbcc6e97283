//! Pipeline run domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::build::{BuildResult, PushResult};
use crate::domain::policy::PolicyDecision;
use crate::domain::request::DeploymentRequest;
use crate::domain::scan::ScanResult;
use crate::error::PipelineError;

/// States of a deployment run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    Pending,
    Validating,
    Building,
    Scanning,
    Gating,
    Pushing,
    Cleanup,
    Completed,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed)
    }

    /// The state reached on success from this one, if any
    pub fn next(self) -> Option<PipelineState> {
        use PipelineState::*;
        match self {
            Pending => Some(Validating),
            Validating => Some(Building),
            Building => Some(Scanning),
            Scanning => Some(Gating),
            Gating => Some(Pushing),
            Pushing => Some(Cleanup),
            Cleanup => Some(Completed),
            Completed | Failed => None,
        }
    }

    /// Whether `self -> to` is an edge of the state machine
    ///
    /// Success edges only move one step forward; `Failed` is reachable from
    /// every non-terminal state. Terminal states have no outgoing edges.
    pub fn can_transition_to(self, to: PipelineState) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == PipelineState::Failed || self.next() == Some(to)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Pending => "pending",
            PipelineState::Validating => "validating",
            PipelineState::Building => "building",
            PipelineState::Scanning => "scanning",
            PipelineState::Gating => "gating",
            PipelineState::Pushing => "pushing",
            PipelineState::Cleanup => "cleanup",
            PipelineState::Completed => "completed",
            PipelineState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Build outcome for one image of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBuild {
    pub repository: String,
    pub tag: String,
    pub result: BuildResult,
}

/// A single deployment run
///
/// Owned by the pipeline while it executes and handed back to the caller
/// once it reaches a terminal state.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub request: DeploymentRequest,
    pub state: PipelineState,
    pub dry_run: bool,
    pub decisions: Vec<PolicyDecision>,
    pub scan: Option<ScanResult>,
    pub builds: Vec<ImageBuild>,
    pub pushes: Vec<PushResult>,
    /// Reasons for the final state (empty on success)
    pub reasons: Vec<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Typed cause of a failed run
    #[serde(skip)]
    pub error: Option<PipelineError>,
}

impl PipelineRun {
    pub fn new(request: DeploymentRequest, dry_run: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            state: PipelineState::Pending,
            dry_run,
            decisions: Vec::new(),
            scan: None,
            builds: Vec::new(),
            pushes: Vec::new(),
            reasons: Vec::new(),
            started_at: chrono::Utc::now(),
            ended_at: None,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Completed
    }

    /// Repositories whose push succeeded
    pub fn pushed_repositories(&self) -> Vec<&str> {
        self.pushes
            .iter()
            .filter(|p| p.success)
            .map(|p| p.repository.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelineState::*;

    #[test]
    fn test_forward_edges() {
        let order = [
            Pending, Validating, Building, Scanning, Gating, Pushing, Cleanup, Completed,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_no_skipping() {
        assert!(!Building.can_transition_to(Pushing));
        assert!(!Pending.can_transition_to(Building));
        assert!(!Gating.can_transition_to(Cleanup));
        assert!(!Scanning.can_transition_to(Building));
    }

    #[test]
    fn test_failed_reachable_from_non_terminal() {
        for state in [Pending, Validating, Building, Scanning, Gating, Pushing, Cleanup] {
            assert!(state.can_transition_to(Failed));
        }
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Pending));
    }
}
