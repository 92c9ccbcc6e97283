//! Secret store adapters
//!
//! Resolves named secrets from an external provider into in-memory values.
//! Stores only read; nothing is ever written back. Errors name the secret,
//! never its value or the contents of the file it came from.

mod env;
mod file;

pub use env::EnvSecretStore;
pub use file::FileSecretStore;

use std::path::PathBuf;
use thiserror::Error;
use tollgate_core::domain::secret::Secret;

/// Errors that can occur when resolving a secret
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    /// No secret with this name exists in the store
    #[error("secret '{0}' not found")]
    NotFound(String),

    /// The secret exists but could not be read
    #[error("secret '{0}' could not be read")]
    Unreadable(String),
}

impl SecretError {
    /// Name of the secret the error refers to
    pub fn name(&self) -> &str {
        match self {
            SecretError::NotFound(name) | SecretError::Unreadable(name) => name,
        }
    }
}

/// Resolves secrets by name
pub trait SecretStore: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Secret, SecretError>;
}

/// Selects which secret store backs a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretStoreConfig {
    /// Environment variables named `<prefix><NAME>`
    Env { prefix: String },
    /// One file per secret in `dir`
    File { dir: PathBuf },
}

impl SecretStoreConfig {
    /// Creates the configured store
    pub fn build(&self) -> Box<dyn SecretStore> {
        match self {
            SecretStoreConfig::Env { prefix } => Box::new(EnvSecretStore::new(prefix.clone())),
            SecretStoreConfig::File { dir } => Box::new(FileSecretStore::new(dir.clone())),
        }
    }
}
