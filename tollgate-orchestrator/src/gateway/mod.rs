//! Image builder gateway
//!
//! Thin interface to an external image builder and registry. The
//! orchestrator never constructs images itself; it invokes the builder and
//! interprets the result:
//! - Classifying builder failures as transient, auth, malformed tag or permanent
//! - Retrying transient failures with exponential backoff
//! - Podman implementation of the gateway

mod podman;

pub use podman::{PodmanBuilder, check_podman_available};

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tollgate_core::domain::build::{BuildResult, PushResult};
use tollgate_core::domain::image::ImageRef;
use tollgate_core::domain::secret::RegistryCredentials;
use tracing::warn;

/// Errors reported by the builder
///
/// Messages come from the builder's output and never include credentials.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuilderError {
    /// Likely to succeed on retry (network timeout, registry 5xx)
    #[error("transient builder error: {0}")]
    Transient(String),

    /// Registry rejected the credentials
    #[error("registry authentication failed: {0}")]
    Auth(String),

    /// The image reference was rejected
    #[error("malformed image reference: {0}")]
    MalformedTag(String),

    /// Any other failure
    #[error("builder failed: {0}")]
    Failed(String),
}

impl BuilderError {
    /// Check if this error should be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, BuilderError::Transient(_))
    }

    /// Check if this error is an authentication failure
    pub fn is_auth(&self) -> bool {
        matches!(self, BuilderError::Auth(_))
    }
}

const AUTH_MARKERS: &[&str] = &[
    "unauthorized",
    "authentication required",
    "access to the resource is denied",
    "access denied",
    "invalid username/password",
    "incorrect username or password",
];

const MALFORMED_MARKERS: &[&str] = &["invalid reference format", "invalid tag"];

const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "connection reset",
    "connection refused",
    "tls handshake",
    "temporary failure",
    "i/o timeout",
    "unexpected eof",
    "502 bad gateway",
    "503 service unavailable",
    "504 gateway timeout",
    "too many requests",
];

/// Classifies a builder failure from its exit code and error output
pub fn classify(exit_code: i32, stderr: &str) -> BuilderError {
    let lower = stderr.to_lowercase();
    let message = format!("exit_code={} {}", exit_code, stderr.trim());

    if AUTH_MARKERS.iter().any(|m| lower.contains(m)) {
        BuilderError::Auth(message)
    } else if MALFORMED_MARKERS.iter().any(|m| lower.contains(m)) {
        BuilderError::MalformedTag(message)
    } else if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
        BuilderError::Transient(message)
    } else {
        BuilderError::Failed(message)
    }
}

/// Retry budget for transient builder errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(2),
        }
    }
}

/// Runs `operation`, retrying transient failures according to `policy`
///
/// Non-transient errors are returned immediately.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, BuilderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BuilderError>>,
{
    let mut retry = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && retry < policy.max_retries => {
                let delay = policy.delay_for(retry);
                retry += 1;
                warn!(
                    "{} failed with transient error (retry {}/{} in {:?}): {}",
                    label, retry, policy.max_retries, delay, e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// External image builder and registry
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Builds and tags an image
    async fn build(&self, image: &ImageRef) -> Result<BuildResult, BuilderError>;

    /// Pushes a built image using the given registry credentials
    async fn push(
        &self,
        image: &ImageRef,
        credentials: &RegistryCredentials,
    ) -> Result<PushResult, BuilderError>;

    /// Removes local build artifacts for an image
    async fn remove(&self, image: &ImageRef) -> Result<(), BuilderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_classify() {
        assert!(classify(125, "Error: unauthorized: authentication required").is_auth());
        assert!(matches!(
            classify(125, "Error: invalid reference format"),
            BuilderError::MalformedTag(_)
        ));
        assert!(classify(125, "dial tcp: i/o timeout").is_transient());
        assert!(
            classify(125, "received unexpected HTTP status: 503 Service Unavailable")
                .is_transient()
        );
        assert!(matches!(
            classify(1, "Error: no such file Dockerfile"),
            BuilderError::Failed(_)
        ));
    }

    #[test]
    fn test_backoff_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(2), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_transient_errors_retried_up_to_limit() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let result: Result<(), BuilderError> =
            with_retry(&fast_policy(2), "push", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(BuilderError::Transient("connection reset".into()))
            })
            .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let result = with_retry(&fast_policy(2), "build", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(BuilderError::Transient("timeout".into()))
            } else {
                Ok("sha256:abc")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "sha256:abc");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_error_not_retried() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let result: Result<(), BuilderError> =
            with_retry(&fast_policy(2), "push", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(BuilderError::Auth("denied".into()))
            })
            .await;

        assert!(result.unwrap_err().is_auth());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
