//! Deployment pipeline
//!
//! Drives one deployment request through
//! `Pending -> Validating -> Building -> Scanning -> Gating -> Pushing -> Cleanup -> Completed`,
//! moving to `Failed` from whichever state an error occurs in. Every
//! transition is written to the audit log.
//!
//! Only one run is active per pipeline. Builds and pushes for independent
//! images run concurrently, but every image is gated before any push begins.
//! Cancellation is observed at state boundaries only; an in-flight build or
//! push is allowed to finish (or time out) first.

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tollgate_core::PipelineError;
use tollgate_core::domain::audit::{AuditEntry, AuditEvent};
use tollgate_core::domain::build::{BuildResult, PushResult};
use tollgate_core::domain::image::ImageRef;
use tollgate_core::domain::pipeline::{ImageBuild, PipelineRun, PipelineState};
use tollgate_core::domain::request::DeploymentRequest;
use tollgate_core::domain::scan::ScanResult;
use tollgate_core::domain::secret::RegistryCredentials;
use tracing::{debug, error, info, warn};

use crate::audit::AuditLog;
use crate::config::OrchestratorConfig;
use crate::gateway::{BuilderError, ImageBuilder, RetryPolicy, with_retry};
use crate::policy::PolicyEngine;
use crate::scanner::{ScanError, SecretScanner};
use crate::secrets::SecretStore;

/// Reason recorded when pushes are skipped
pub const DRY_RUN: &str = "dry-run";

/// Per-run options
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Run every stage except the pushes
    pub dry_run: bool,
    /// Cancels the run at the next state boundary
    pub cancel: CancellationToken,
}

/// Settings the pipeline needs from the orchestrator configuration
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub registry_user_secret: String,
    pub registry_password_secret: String,
    pub operation_timeout: Duration,
    pub retry: RetryPolicy,
}

impl From<&OrchestratorConfig> for PipelineSettings {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            registry_user_secret: config.registry_user_secret.clone(),
            registry_password_secret: config.registry_password_secret.clone(),
            operation_timeout: config.operation_timeout,
            retry: config.retry,
        }
    }
}

/// The deployment state machine and its collaborators
pub struct DeploymentPipeline {
    policy: PolicyEngine,
    builder: Arc<dyn ImageBuilder>,
    scanner: Arc<dyn SecretScanner>,
    secrets: Arc<dyn SecretStore>,
    audit: Arc<dyn AuditLog>,
    settings: PipelineSettings,
    active: Mutex<()>,
}

impl DeploymentPipeline {
    pub fn new(
        policy: PolicyEngine,
        builder: Arc<dyn ImageBuilder>,
        scanner: Arc<dyn SecretScanner>,
        secrets: Arc<dyn SecretStore>,
        audit: Arc<dyn AuditLog>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            policy,
            builder,
            scanner,
            secrets,
            audit,
            settings,
            active: Mutex::new(()),
        }
    }

    pub fn audit(&self) -> &Arc<dyn AuditLog> {
        &self.audit
    }

    /// Runs one deployment request to a terminal state
    ///
    /// A failed deployment is returned as `Ok` with `state == Failed` and its
    /// reasons. `Err` means the run could not be carried out at all: the
    /// pipeline was busy, or the audit log could not be written.
    pub async fn run(
        &self,
        request: DeploymentRequest,
        options: RunOptions,
    ) -> Result<PipelineRun, PipelineError> {
        let _guard = self.active.try_lock().map_err(|_| {
            warn!("Rejecting request for branch {}: pipeline busy", request.branch());
            PipelineError::PipelineBusy
        })?;

        let mut driver = RunDriver {
            pipeline: self,
            run: PipelineRun::new(request, options.dry_run),
            cancel: options.cancel,
            built: Vec::new(),
        };

        info!(
            "Run {} started for {} ({} image(s)){}",
            driver.run.id,
            driver.run.request.branch(),
            driver.run.request.images().len(),
            if driver.run.dry_run { " [dry-run]" } else { "" }
        );

        match driver.execute().await {
            Ok(()) => {}
            Err(PipelineError::Audit(message)) => {
                error!("Run {} aborted: audit log unavailable: {}", driver.run.id, message);
                driver.remove_built().await;
                return Err(PipelineError::Audit(message));
            }
            Err(e) => {
                driver.fail(e)?;
                driver.remove_built().await;
            }
        }

        driver.run.ended_at = Some(chrono::Utc::now());
        info!(
            "Run {} finished: {}{}",
            driver.run.id,
            driver.run.state,
            if driver.run.reasons.is_empty() {
                String::new()
            } else {
                format!(" ({})", driver.run.reasons.join(", "))
            }
        );

        Ok(driver.run)
    }
}

/// State of one run while it executes
struct RunDriver<'a> {
    pipeline: &'a DeploymentPipeline,
    run: PipelineRun,
    cancel: CancellationToken,
    /// Images built so far, for cleanup
    built: Vec<ImageRef>,
}

/// Outcome of one image operation
enum OpError {
    Builder(BuilderError),
    TimedOut,
}

impl<'a> RunDriver<'a> {
    async fn execute(&mut self) -> Result<(), PipelineError> {
        self.advance(PipelineState::Validating, Vec::new())?;
        self.validate()?;

        self.advance(PipelineState::Building, Vec::new())?;
        let images = self.build_all().await?;

        self.advance(PipelineState::Scanning, Vec::new())?;
        let scan = self.scan().await?;

        self.advance(PipelineState::Gating, Vec::new())?;
        self.gate(&images, &scan)?;

        if self.run.dry_run {
            self.advance(PipelineState::Pushing, vec![DRY_RUN.to_string()])?;
            info!("Run {}: dry run, skipping pushes", self.run.id);
        } else {
            self.advance(PipelineState::Pushing, Vec::new())?;
            self.push_all(&images).await?;
        }

        self.advance(PipelineState::Cleanup, Vec::new())?;
        self.remove_built().await;
        self.transition(PipelineState::Completed, Vec::new())?;

        Ok(())
    }

    /// Moves to the next state, unless the run was cancelled
    fn advance(&mut self, to: PipelineState, reasons: Vec<String>) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            info!("Run {} cancelled in state {}", self.run.id, self.run.state);
            return Err(PipelineError::Cancelled);
        }
        self.transition(to, reasons)
    }

    fn transition(&mut self, to: PipelineState, reasons: Vec<String>) -> Result<(), PipelineError> {
        let from = self.run.state;
        if !from.can_transition_to(to) {
            error!("Run {}: refusing illegal transition {} -> {}", self.run.id, from, to);
            return Err(PipelineError::IllegalTransition { from, to });
        }

        self.record(AuditEntry::transition(self.run.id, from, to, reasons))?;
        self.run.state = to;
        debug!("Run {}: {} -> {}", self.run.id, from, to);
        Ok(())
    }

    fn record(&self, entry: AuditEntry) -> Result<(), PipelineError> {
        self.pipeline
            .audit
            .append(entry)
            .map_err(|e| PipelineError::Audit(e.to_string()))
    }

    fn fail(&mut self, err: PipelineError) -> Result<(), PipelineError> {
        let reasons = err.reasons();
        warn!(
            "Run {} failed in state {}: {}",
            self.run.id, self.run.state, err
        );

        self.transition(PipelineState::Failed, reasons.clone())?;
        self.run.reasons = reasons;
        self.run.error = Some(err);
        Ok(())
    }

    fn validate(&self) -> Result<(), PipelineError> {
        let problems = self.run.request.shape_problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::InvalidRequest(problems))
        }
    }

    async fn timed<T, F>(&self, future: F) -> Result<T, OpError>
    where
        F: Future<Output = Result<T, BuilderError>>,
    {
        match tokio::time::timeout(self.pipeline.settings.operation_timeout, future).await {
            Ok(result) => result.map_err(OpError::Builder),
            Err(_) => Err(OpError::TimedOut),
        }
    }

    /// Builds every image; any failure fails the whole run
    async fn build_all(&mut self) -> Result<Vec<ImageRef>, PipelineError> {
        let builder = &self.pipeline.builder;
        let retry = self.pipeline.settings.retry;
        let requested = self.run.request.images().to_vec();

        let results = join_all(requested.iter().map(|image| {
            let label = format!("build {}", image);
            self.timed(async move {
                with_retry(&retry, &label, || builder.build(image)).await
            })
        }))
        .await;

        let mut images = Vec::with_capacity(requested.len());
        let mut failed = Vec::new();
        let mut timed_out = false;

        for (image, result) in requested.into_iter().zip(results) {
            match result {
                Ok(build) => {
                    self.record_build(&image, &build)?;
                    self.built.push(image.clone());
                    images.push(resolve_runtime_user(image, &build));
                }
                Err(OpError::Builder(e)) => {
                    warn!("Build of {} failed: {}", image, e);
                    failed.push(image.repository.clone());
                }
                Err(OpError::TimedOut) => {
                    warn!("Build of {} timed out", image);
                    // The build may have tagged the image before it was stopped
                    self.built.push(image);
                    timed_out = true;
                }
            }
        }

        if timed_out {
            Err(PipelineError::Timeout {
                stage: "build".to_string(),
            })
        } else if !failed.is_empty() {
            Err(PipelineError::BuildFailed {
                repositories: failed,
            })
        } else {
            Ok(images)
        }
    }

    fn record_build(&mut self, image: &ImageRef, build: &BuildResult) -> Result<(), PipelineError> {
        self.record(AuditEntry::new(
            self.run.id,
            AuditEvent::ImageBuilt {
                repository: image.repository.clone(),
                tag: image.tag.clone(),
                sha256: build.sha256.clone(),
            },
        ))?;
        self.run.builds.push(ImageBuild {
            repository: image.repository.clone(),
            tag: image.tag.clone(),
            result: build.clone(),
        });
        Ok(())
    }

    async fn scan(&mut self) -> Result<ScanResult, PipelineError> {
        let timeout = self.pipeline.settings.operation_timeout;

        let scan = match tokio::time::timeout(timeout, self.pipeline.scanner.scan()).await {
            Ok(Ok(scan)) => scan,
            Ok(Err(ScanError::Unavailable(message))) => {
                return Err(PipelineError::ScanUnavailable(message));
            }
            Err(_) => {
                return Err(PipelineError::Timeout {
                    stage: "scan".to_string(),
                });
            }
        };

        if !scan.is_clean() {
            info!(
                "Run {}: scanner reported {} suspected secret(s)",
                self.run.id, scan.count
            );
        }
        self.run.scan = Some(scan.clone());
        Ok(scan)
    }

    /// Evaluates the policy for all images at once
    fn gate(&mut self, images: &[ImageRef], scan: &ScanResult) -> Result<(), PipelineError> {
        let decision = self.pipeline.policy.evaluate(&self.run.request, images, scan);

        self.record(AuditEntry::new(
            self.run.id,
            AuditEvent::Decision {
                allowed: decision.allowed(),
                reasons: decision.reasons().to_vec(),
            },
        ))?;

        let allowed = decision.allowed();
        let reasons = decision.reasons().to_vec();
        self.run.decisions.push(decision);

        if allowed {
            info!("Run {}: policy gate passed", self.run.id);
            Ok(())
        } else {
            Err(PipelineError::PolicyViolation(reasons))
        }
    }

    fn resolve_credentials(&self) -> Result<RegistryCredentials, PipelineError> {
        let settings = &self.pipeline.settings;
        let resolve = |name: &str| {
            self.pipeline
                .secrets
                .resolve(name)
                .map_err(|e| PipelineError::SecretNotFound(e.name().to_string()))
        };

        Ok(RegistryCredentials {
            username: resolve(&settings.registry_user_secret)?,
            password: resolve(&settings.registry_password_secret)?,
        })
    }

    /// Pushes every image
    ///
    /// Pushes are not transactional: images pushed before a failure stay in
    /// the registry and are reported in `run.pushes`.
    async fn push_all(&mut self, images: &[ImageRef]) -> Result<(), PipelineError> {
        // Dropped (and zeroed) when this function returns
        let credentials = self.resolve_credentials()?;

        let builder = &self.pipeline.builder;
        let retry = self.pipeline.settings.retry;
        let creds = &credentials;

        let results = join_all(images.iter().map(|image| {
            let label = format!("push {}", image);
            self.timed(async move {
                with_retry(&retry, &label, || builder.push(image, creds)).await
            })
        }))
        .await;

        let mut failed = Vec::new();
        let mut auth_failed = Vec::new();
        let mut timed_out = false;

        for (image, result) in images.iter().zip(results) {
            let push = match result {
                Ok(push) => push,
                Err(err) => {
                    match err {
                        OpError::Builder(e) => {
                            warn!("Push of {} failed: {}", image, e);
                            if e.is_auth() {
                                auth_failed.push(image.repository.clone());
                            }
                        }
                        OpError::TimedOut => {
                            warn!("Push of {} timed out", image);
                            timed_out = true;
                        }
                    }
                    failed.push(image.repository.clone());
                    PushResult {
                        repository: image.repository.clone(),
                        tag: image.tag.clone(),
                        success: false,
                        digest: None,
                    }
                }
            };

            self.record(AuditEntry::new(
                self.run.id,
                AuditEvent::ImagePushed {
                    repository: push.repository.clone(),
                    tag: push.tag.clone(),
                    success: push.success,
                    digest: push.digest.clone(),
                },
            ))?;
            self.run.pushes.push(push);
        }

        if timed_out {
            Err(PipelineError::Timeout {
                stage: "push".to_string(),
            })
        } else if failed.is_empty() {
            Ok(())
        } else if failed.len() == auth_failed.len() {
            Err(PipelineError::AuthFailed {
                repositories: auth_failed,
            })
        } else {
            Err(PipelineError::PushFailed {
                repositories: failed,
                auth_failed,
            })
        }
    }

    /// Best-effort removal of locally built images
    async fn remove_built(&mut self) {
        let timeout = self.pipeline.settings.operation_timeout;

        for image in self.built.drain(..) {
            match tokio::time::timeout(timeout, self.pipeline.builder.remove(&image)).await {
                Ok(Ok(())) => debug!("Removed local image {}", image),
                Ok(Err(e)) => warn!("Failed to remove local image {}: {}", image, e),
                Err(_) => warn!("Timed out removing local image {}", image),
            }
        }
    }
}

/// Fills in the runtime user from the build when the request left it unset
fn resolve_runtime_user(image: ImageRef, build: &BuildResult) -> ImageRef {
    match (&image.runtime_user, &build.runtime_user) {
        (None, Some(user)) => image.with_runtime_user(user.clone()),
        _ => image,
    }
}
