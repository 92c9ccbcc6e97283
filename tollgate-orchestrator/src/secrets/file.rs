//! File-backed secret store
//!
//! One file per secret, as mounted by docker/podman secrets or Kubernetes
//! secret volumes.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tollgate_core::domain::secret::{Secret, SecretSource};
use tracing::debug;

use super::{SecretError, SecretStore};

/// Reads secrets from `<dir>/<name>`
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the secret file, if the name is a plain file name
    fn path_for(&self, name: &str) -> Option<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Some(self.dir.join(name)),
            _ => None,
        }
    }
}

impl SecretStore for FileSecretStore {
    fn resolve(&self, name: &str) -> Result<Secret, SecretError> {
        let path = self
            .path_for(name)
            .ok_or_else(|| SecretError::NotFound(name.to_string()))?;

        let mut value = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SecretError::NotFound(name.to_string()));
            }
            Err(_) => return Err(SecretError::Unreadable(name.to_string())),
        };

        // Mounted secrets usually end with a newline the writer didn't mean
        if value.last() == Some(&b'\n') {
            value.pop();
            if value.last() == Some(&b'\r') {
                value.pop();
            }
        }

        debug!("Resolved secret '{}' from file", name);
        Ok(Secret::new(name, value, SecretSource::File))
    }
}
