//! Secret domain types

use std::fmt;
use zeroize::Zeroizing;

/// Where a secret value was resolved from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    EnvVar,
    File,
    VendorApi,
}

impl fmt::Display for SecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretSource::EnvVar => write!(f, "env"),
            SecretSource::File => write!(f, "file"),
            SecretSource::VendorApi => write!(f, "vendor-api"),
        }
    }
}

/// A resolved secret
///
/// The value is zeroed when the secret is dropped. `Secret` deliberately does
/// not implement `Serialize` or `Clone`, and its `Debug` output omits the value.
pub struct Secret {
    name: String,
    value: Zeroizing<Vec<u8>>,
    source: SecretSource,
}

impl Secret {
    pub fn new(name: impl Into<String>, value: Vec<u8>, source: SecretSource) -> Self {
        Self {
            name: name.into(),
            value: Zeroizing::new(value),
            source,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> SecretSource {
        self.source
    }

    /// Raw secret bytes
    ///
    /// Callers must hand these straight to the consumer (e.g. a registry
    /// auth file) and never format them.
    pub fn expose(&self) -> &[u8] {
        &self.value
    }

    /// Secret as UTF-8, if it is valid UTF-8
    pub fn expose_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Credentials used to push to an image registry
#[derive(Debug)]
pub struct RegistryCredentials {
    pub username: Secret,
    pub password: Secret,
}
