//! Audit record types
//!
//! Audit entries carry non-secret metadata only. None of the types below has
//! a field that can hold a `Secret`, so secret values cannot reach the log.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::pipeline::PipelineState;

/// One append-only audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub run_id: Uuid,
    pub event: AuditEvent,
}

/// What an audit record describes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    Transition {
        from: PipelineState,
        to: PipelineState,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        reasons: Vec<String>,
    },
    Decision {
        allowed: bool,
        reasons: Vec<String>,
    },
    ImageBuilt {
        repository: String,
        tag: String,
        sha256: String,
    },
    ImagePushed {
        repository: String,
        tag: String,
        success: bool,
        digest: Option<String>,
    },
}

impl AuditEntry {
    pub fn new(run_id: Uuid, event: AuditEvent) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            run_id,
            event,
        }
    }

    pub fn transition(
        run_id: Uuid,
        from: PipelineState,
        to: PipelineState,
        reasons: Vec<String>,
    ) -> Self {
        Self::new(run_id, AuditEvent::Transition { from, to, reasons })
    }
}

/// Reconstructs the states a run traversed from its audit entries
///
/// Entries must be in append order. Non-transition entries and entries for
/// other runs are ignored.
pub fn replay_states<'a>(
    entries: impl IntoIterator<Item = &'a AuditEntry>,
    run_id: Uuid,
) -> Vec<PipelineState> {
    let mut states = Vec::new();
    for entry in entries.into_iter().filter(|e| e.run_id == run_id) {
        if let AuditEvent::Transition { from, to, .. } = &entry.event {
            if states.is_empty() {
                states.push(*from);
            }
            states.push(*to);
        }
    }
    states
}
