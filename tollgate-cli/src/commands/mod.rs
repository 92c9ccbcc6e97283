//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod audit;
mod check;
mod run;

pub use audit::AuditArgs;
pub use run::RunArgs;

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use std::process::ExitCode;
use tollgate_orchestrator::OrchestratorConfig;
use tollgate_orchestrator::lock::RunLock;

pub const EXIT_FAILED: u8 = 1;
pub const EXIT_USAGE: u8 = 2;
pub const EXIT_BUSY: u8 = 3;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a deployment
    Run(RunArgs),
    /// Show the audit log
    Audit(AuditArgs),
    /// Check the builder, secret store and audit log
    Check,
    /// Remove a run lock left behind by a crashed process
    Unlock,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The orchestrator configuration
///
/// # Returns
/// The process exit code, or an error for unexpected failures
pub async fn handle_command(command: Commands, config: &OrchestratorConfig) -> Result<ExitCode> {
    match command {
        Commands::Run(args) => run::handle_run(args, config).await,
        Commands::Audit(args) => audit::handle_audit(args, config),
        Commands::Check => check::handle_check(config).await,
        Commands::Unlock => unlock(config),
    }
}

fn unlock(config: &OrchestratorConfig) -> Result<ExitCode> {
    let path = &config.lock_file_path;

    if RunLock::force_release(path)? {
        println!("{} Removed {}", "✓".green(), path.display());
    } else {
        println!("{}", format!("No lock at {}.", path.display()).yellow());
    }

    Ok(ExitCode::SUCCESS)
}
