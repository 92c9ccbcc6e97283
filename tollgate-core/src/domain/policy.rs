//! Policy decision types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Outcome of a policy gate
///
/// `allowed` is true exactly when no reasons were collected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    allowed: bool,
    reasons: Vec<String>,
}

impl PolicyDecision {
    pub fn from_reasons(reasons: Vec<String>) -> Self {
        Self {
            allowed: reasons.is_empty(),
            reasons,
        }
    }

    pub fn allowed(&self) -> bool {
        self.allowed
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    /// Reasons as a set, for order-insensitive comparison
    pub fn reason_set(&self) -> BTreeSet<&str> {
        self.reasons.iter().map(String::as_str).collect()
    }
}
