//! Tollgate CLI
//!
//! Command-line front end for the deployment pipeline. Exit codes:
//! - 0: run completed (or command succeeded)
//! - 1: run failed
//! - 2: usage or configuration error
//! - 3: another run is in progress

mod commands;

use clap::Parser;
use colored::*;
use commands::{Commands, EXIT_FAILED, EXIT_USAGE, handle_command};
use std::process::ExitCode;
use tollgate_orchestrator::OrchestratorConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tollgate")]
#[command(about = "Secret-aware deployment orchestrator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout carries only the report
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tollgate_cli=info,tollgate_orchestrator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match OrchestratorConfig::from_env().and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Configuration error:".red().bold(), e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    match handle_command(cli.command, &config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::from(EXIT_FAILED)
        }
    }
}
