//! Tollgate Orchestrator
//!
//! Runs secret-aware deployments: builds images, scans the source, gates the
//! result on policy and pushes to the registry with credentials resolved from
//! a secret store.
//!
//! This crate contains:
//! - Pipeline: the deployment state machine
//! - Adapters: secret stores, image builder gateway, secret scanner, audit log
//! - Configuration and the cross-process run lock

pub mod audit;
pub mod config;
pub mod gateway;
pub mod lock;
pub mod pipeline;
pub mod policy;
pub mod scanner;
pub mod secrets;

pub use config::{ConfigError, OrchestratorConfig};
pub use pipeline::{DeploymentPipeline, PipelineSettings, RunOptions};
