//! Orchestrator configuration
//!
//! Defines all configurable parameters for a deployment run: the deploy
//! branch, where secrets come from, audit and lock file locations, and the
//! timeout/retry budget for builder operations.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::gateway::RetryPolicy;
use crate::policy::PolicyConfig;
use crate::secrets::SecretStoreConfig;

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    #[error("{0} must be greater than 0")]
    Zero(&'static str),

    #[error("invalid value for {name}: '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Branch that is allowed to deploy
    pub deploy_branch: String,

    /// Append-only audit log (JSON lines)
    pub audit_log_path: PathBuf,

    /// Lock file guarding against concurrent runs across processes
    pub lock_file_path: PathBuf,

    /// Where registry credentials are resolved from
    pub secret_store: SecretStoreConfig,

    /// Secret holding the registry user name
    pub registry_user_secret: String,

    /// Secret holding the registry password or token
    pub registry_password_secret: String,

    /// Maximum time for one build, scan or push
    pub operation_timeout: Duration,

    /// Retry budget for transient builder errors
    pub retry: RetryPolicy,
}

impl OrchestratorConfig {
    /// Creates a new configuration with defaults
    pub fn new() -> Self {
        Self {
            deploy_branch: "main".to_string(),
            audit_log_path: PathBuf::from(".tollgate/audit.jsonl"),
            lock_file_path: PathBuf::from(".tollgate/pipeline.lock"),
            secret_store: SecretStoreConfig::Env {
                prefix: "TOLLGATE_SECRET_".to_string(),
            },
            registry_user_secret: "registry-user".to_string(),
            registry_password_secret: "registry-password".to_string(),
            operation_timeout: Duration::from_secs(15 * 60),
            retry: RetryPolicy::default(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Every variable is optional and falls back to the default:
    /// - TOLLGATE_DEPLOY_BRANCH (default: main)
    /// - TOLLGATE_AUDIT_LOG (default: .tollgate/audit.jsonl)
    /// - TOLLGATE_LOCK_FILE (default: .tollgate/pipeline.lock)
    /// - TOLLGATE_SECRET_SOURCE (env | file, default: env)
    /// - TOLLGATE_SECRET_DIR (required when the source is file)
    /// - TOLLGATE_SECRET_PREFIX (default: TOLLGATE_SECRET_)
    /// - TOLLGATE_REGISTRY_USER_SECRET (default: registry-user)
    /// - TOLLGATE_REGISTRY_PASSWORD_SECRET (default: registry-password)
    /// - TOLLGATE_OPERATION_TIMEOUT (seconds, default: 900)
    /// - TOLLGATE_MAX_RETRIES (default: 2)
    /// - TOLLGATE_RETRY_BASE_DELAY (milliseconds, default: 2000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::new();

        if let Some(branch) = lookup("TOLLGATE_DEPLOY_BRANCH") {
            config.deploy_branch = branch;
        }
        if let Some(path) = lookup("TOLLGATE_AUDIT_LOG") {
            config.audit_log_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("TOLLGATE_LOCK_FILE") {
            config.lock_file_path = PathBuf::from(path);
        }

        let source = lookup("TOLLGATE_SECRET_SOURCE").unwrap_or_else(|| "env".to_string());
        config.secret_store = match source.as_str() {
            "env" => SecretStoreConfig::Env {
                prefix: lookup("TOLLGATE_SECRET_PREFIX")
                    .unwrap_or_else(|| "TOLLGATE_SECRET_".to_string()),
            },
            "file" => SecretStoreConfig::File {
                dir: lookup("TOLLGATE_SECRET_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_default(),
            },
            other => {
                return Err(ConfigError::Invalid {
                    name: "TOLLGATE_SECRET_SOURCE",
                    value: other.to_string(),
                });
            }
        };

        if let Some(name) = lookup("TOLLGATE_REGISTRY_USER_SECRET") {
            config.registry_user_secret = name;
        }
        if let Some(name) = lookup("TOLLGATE_REGISTRY_PASSWORD_SECRET") {
            config.registry_password_secret = name;
        }

        if let Some(secs) = parse_var::<u64>(&lookup, "TOLLGATE_OPERATION_TIMEOUT")? {
            config.operation_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_var::<u32>(&lookup, "TOLLGATE_MAX_RETRIES")? {
            config.retry.max_retries = retries;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "TOLLGATE_RETRY_BASE_DELAY")? {
            config.retry.base_delay = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Policy settings derived from this configuration
    pub fn policy(&self) -> PolicyConfig {
        PolicyConfig {
            deploy_branch: self.deploy_branch.clone(),
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deploy_branch.trim().is_empty() {
            return Err(ConfigError::Empty("deploy_branch"));
        }

        if self.operation_timeout.is_zero() {
            return Err(ConfigError::Zero("operation_timeout"));
        }

        if self.registry_user_secret.is_empty() {
            return Err(ConfigError::Empty("registry_user_secret"));
        }

        if self.registry_password_secret.is_empty() {
            return Err(ConfigError::Empty("registry_password_secret"));
        }

        if let SecretStoreConfig::File { dir } = &self.secret_store {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::Empty("secret directory"));
            }
        }

        Ok(())
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.deploy_branch, "main");
        assert_eq!(config.operation_timeout, Duration::from_secs(900));
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.base_delay, Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let config = OrchestratorConfig::from_lookup(lookup_from(&[
            ("TOLLGATE_DEPLOY_BRANCH", "release"),
            ("TOLLGATE_SECRET_SOURCE", "file"),
            ("TOLLGATE_SECRET_DIR", "/run/secrets"),
            ("TOLLGATE_OPERATION_TIMEOUT", "60"),
            ("TOLLGATE_MAX_RETRIES", "0"),
        ]))
        .unwrap();

        assert_eq!(config.deploy_branch, "release");
        assert_eq!(
            config.secret_store,
            SecretStoreConfig::File {
                dir: PathBuf::from("/run/secrets")
            }
        );
        assert_eq!(config.operation_timeout, Duration::from_secs(60));
        assert_eq!(config.retry.max_retries, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values() {
        let err = OrchestratorConfig::from_lookup(lookup_from(&[(
            "TOLLGATE_SECRET_SOURCE",
            "vault",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let err = OrchestratorConfig::from_lookup(lookup_from(&[(
            "TOLLGATE_OPERATION_TIMEOUT",
            "soon",
        )]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "TOLLGATE_OPERATION_TIMEOUT",
                ..
            }
        ));
    }

    #[test]
    fn test_config_validation() {
        let mut config = OrchestratorConfig::default();

        config.deploy_branch = String::new();
        assert_eq!(config.validate(), Err(ConfigError::Empty("deploy_branch")));
        config.deploy_branch = "main".to_string();

        config.operation_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
        config.operation_timeout = Duration::from_secs(1);

        config.secret_store = SecretStoreConfig::File {
            dir: PathBuf::new(),
        };
        assert!(config.validate().is_err());
    }
}
