//! Secret scan result types

use serde::{Deserialize, Serialize};

/// A suspected hardcoded secret
///
/// Records where the match is and which rule fired, never the matched text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretMatch {
    pub path: String,
    pub line: usize,
    pub rule: String,
}

/// Result reported by a secret scanner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub count: usize,
    pub matches: Vec<SecretMatch>,
}

impl ScanResult {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn from_matches(matches: Vec<SecretMatch>) -> Self {
        Self {
            count: matches.len(),
            matches,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.count == 0
    }
}
