//! JSON-lines audit log
//!
//! One `AuditEntry` per line, appended with `O_APPEND`. Reading streams the
//! file line by line.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tollgate_core::domain::audit::AuditEntry;

use super::{AuditEntries, AuditError, AuditLog};

/// Audit log persisted as JSON lines
pub struct FileAuditLog {
    path: PathBuf,
    /// Serializes appends from concurrent tasks
    writer: Mutex<()>,
}

impl FileAuditLog {
    /// Opens (or prepares to create) the log at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditLog for FileAuditLog {
    fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(&entry).map_err(AuditError::Encode)?;
        line.push('\n');

        let _guard = self.writer.lock().map_err(|_| AuditError::LockPoisoned)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn entries(&self) -> Result<AuditEntries<'_>, AuditError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Box::new(std::iter::empty())),
            Err(e) => return Err(e.into()),
        };

        let lines = BufReader::new(file).lines().enumerate();
        Ok(Box::new(lines.filter_map(|(idx, line)| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(
                serde_json::from_str::<AuditEntry>(&line).map_err(|source| {
                    AuditError::Malformed {
                        line: idx + 1,
                        source,
                    }
                }),
            ),
            Err(e) => Some(Err(AuditError::Io(e))),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::domain::audit::{AuditEvent, replay_states};
    use tollgate_core::domain::pipeline::PipelineState;
    use uuid::Uuid;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileAuditLog::new(dir.path().join("audit.jsonl"));
        assert_eq!(log.entries().unwrap().count(), 0);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/audit.jsonl");
        let run = Uuid::new_v4();

        {
            let log = FileAuditLog::new(&path);
            log.append(AuditEntry::transition(
                run,
                PipelineState::Pending,
                PipelineState::Validating,
                vec![],
            ))
            .unwrap();
            log.append(AuditEntry::new(
                run,
                AuditEvent::ImagePushed {
                    repository: "be".into(),
                    tag: "1".into(),
                    success: true,
                    digest: Some("sha256:1".into()),
                },
            ))
            .unwrap();
            log.append(AuditEntry::transition(
                run,
                PipelineState::Validating,
                PipelineState::Failed,
                vec!["invalid-request".into()],
            ))
            .unwrap();
        }

        let reopened = FileAuditLog::new(&path);
        let entries: Vec<AuditEntry> = reopened.entries().unwrap().map(Result::unwrap).collect();

        assert_eq!(entries.len(), 3);
        assert_eq!(
            replay_states(&entries, run),
            vec![
                PipelineState::Pending,
                PipelineState::Validating,
                PipelineState::Failed
            ]
        );
    }

    #[test]
    fn test_malformed_line_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        std::fs::write(&path, "not json\n").unwrap();

        let log = FileAuditLog::new(&path);
        let results: Vec<_> = log.entries().unwrap().collect();
        assert!(matches!(results[0], Err(AuditError::Malformed { line: 1, .. })));
    }
}
