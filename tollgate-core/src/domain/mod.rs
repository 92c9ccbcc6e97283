//! Core domain types
//!
//! These types describe a deployment event from the moment a request is
//! accepted until its run is archived. They are shared between the
//! orchestrator (which drives runs) and the CLI (which reports on them).

pub mod audit;
pub mod build;
pub mod image;
pub mod pipeline;
pub mod policy;
pub mod request;
pub mod scan;
pub mod secret;
