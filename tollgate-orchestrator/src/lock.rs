//! Cross-process run lock
//!
//! The pipeline's in-process mutex only guards a single orchestrator
//! instance. Front ends that start one process per run (the CLI) also take
//! this lock file so a second invocation is refused while a run is active.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Lock errors
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process holds the lock
    #[error("pipeline is busy (lock held at {})", .path.display())]
    Busy { path: PathBuf, holder: Option<u32> },

    #[error("failed to take run lock: {0}")]
    Io(#[from] std::io::Error),
}

/// Exclusive lock file, released on drop
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Takes the lock, failing with `Busy` if the file already exists
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = std::fs::read_to_string(&path)
                    .ok()
                    .and_then(|s| s.trim().parse::<u32>().ok());
                return Err(LockError::Busy { path, holder });
            }
            Err(e) => return Err(e.into()),
        };

        writeln!(file, "{}", std::process::id())?;
        debug!("Acquired run lock {}", path.display());

        Ok(Self { path })
    }

    /// Removes a lock left behind by a crashed process
    pub fn force_release(path: &Path) -> Result<bool, LockError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to release run lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/pipeline.lock");

        let lock = RunLock::acquire(&path).unwrap();
        match RunLock::acquire(&path) {
            Err(LockError::Busy { holder, .. }) => assert_eq!(holder, Some(std::process::id())),
            other => panic!("expected busy, got {:?}", other),
        }

        drop(lock);
        assert!(!path.exists());
        assert!(RunLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_force_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.lock");
        std::fs::write(&path, "12345\n").unwrap();

        assert!(RunLock::force_release(&path).unwrap());
        assert!(!RunLock::force_release(&path).unwrap());
        assert!(RunLock::acquire(&path).is_ok());
    }
}
