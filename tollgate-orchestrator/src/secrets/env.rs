//! Environment variable secret store

use std::collections::HashMap;
use std::ffi::OsString;
use tollgate_core::domain::secret::{Secret, SecretSource};
use tracing::debug;

use super::{SecretError, SecretStore};

type Lookup = Box<dyn Fn(&str) -> Option<OsString> + Send + Sync>;

/// Reads secrets from environment variables
///
/// `registry-password` with prefix `TOLLGATE_SECRET_` is read from
/// `TOLLGATE_SECRET_REGISTRY_PASSWORD`.
pub struct EnvSecretStore {
    prefix: String,
    lookup: Lookup,
}

impl EnvSecretStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            lookup: Box::new(|key| std::env::var_os(key)),
        }
    }

    /// Creates a store backed by a fixed variable map instead of the process environment
    pub fn from_vars(prefix: impl Into<String>, vars: HashMap<String, String>) -> Self {
        Self {
            prefix: prefix.into(),
            lookup: Box::new(move |key| vars.get(key).map(OsString::from)),
        }
    }

    /// Variable name a secret is read from
    pub fn var_name(&self, name: &str) -> String {
        let suffix: String = name
            .chars()
            .map(|c| match c {
                '-' | '.' | '/' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        format!("{}{}", self.prefix, suffix)
    }
}

impl SecretStore for EnvSecretStore {
    fn resolve(&self, name: &str) -> Result<Secret, SecretError> {
        let var = self.var_name(name);
        let value = (self.lookup)(&var).ok_or_else(|| SecretError::NotFound(name.to_string()))?;

        if value.is_empty() {
            return Err(SecretError::NotFound(name.to_string()));
        }

        debug!("Resolved secret '{}' from environment", name);
        Ok(Secret::new(
            name,
            value.into_encoded_bytes(),
            SecretSource::EnvVar,
        ))
    }
}
