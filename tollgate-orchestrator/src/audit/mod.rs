//! Audit log
//!
//! Append-only record of pipeline decisions. Entries are never mutated or
//! removed by this module. `entries()` returns a lazy iterator and may be
//! called again at any time to replay the log from the start.

mod file;
mod memory;

pub use file::FileAuditLog;
pub use memory::MemoryAuditLog;

use thiserror::Error;
use tollgate_core::domain::audit::AuditEntry;

/// Audit log errors
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed audit record on line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode audit record: {0}")]
    Encode(serde_json::Error),

    #[error("audit log lock poisoned")]
    LockPoisoned,
}

/// Lazy, finite sequence of audit entries in append order
pub type AuditEntries<'a> = Box<dyn Iterator<Item = Result<AuditEntry, AuditError>> + Send + 'a>;

/// Append-only store of audit entries
pub trait AuditLog: Send + Sync {
    /// Appends one entry
    fn append(&self, entry: AuditEntry) -> Result<(), AuditError>;

    /// Replays all entries from the start
    fn entries(&self) -> Result<AuditEntries<'_>, AuditError>;
}
