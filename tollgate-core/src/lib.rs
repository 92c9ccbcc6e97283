//! Tollgate Core
//!
//! Core types and abstractions for the Tollgate deployment orchestrator.
//!
//! This crate contains:
//! - Domain types: requests, images, secrets, policy decisions, pipeline runs
//! - Error taxonomy shared by the orchestrator and its front ends

pub mod domain;
pub mod error;

pub use error::PipelineError;
