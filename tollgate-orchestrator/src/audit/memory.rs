//! In-memory audit log

use std::sync::Mutex;
use tollgate_core::domain::audit::AuditEntry;

use super::{AuditEntries, AuditError, AuditLog};

/// Audit log held in memory for the life of the process
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries appended so far
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let mut entries = self.entries.lock().map_err(|_| AuditError::LockPoisoned)?;
        entries.push(entry);
        Ok(())
    }

    fn entries(&self) -> Result<AuditEntries<'_>, AuditError> {
        let snapshot = self
            .entries
            .lock()
            .map_err(|_| AuditError::LockPoisoned)?
            .clone();
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::domain::pipeline::PipelineState;
    use uuid::Uuid;

    #[test]
    fn test_append_and_replay() {
        let log = MemoryAuditLog::new();
        let run = Uuid::new_v4();

        log.append(AuditEntry::transition(
            run,
            PipelineState::Pending,
            PipelineState::Validating,
            vec![],
        ))
        .unwrap();
        log.append(AuditEntry::transition(
            run,
            PipelineState::Validating,
            PipelineState::Building,
            vec![],
        ))
        .unwrap();

        let first: Vec<_> = log.entries().unwrap().map(Result::unwrap).collect();
        let second: Vec<_> = log.entries().unwrap().map(Result::unwrap).collect();

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(log.len(), 2);
    }
}
