//! Run command
//!
//! Assembles the pipeline from configuration, runs one deployment request
//! and prints the outcome.

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tollgate_core::domain::image::ImageRef;
use tollgate_core::domain::pipeline::{PipelineRun, PipelineState};
use tollgate_core::domain::request::DeploymentRequest;
use tollgate_orchestrator::audit::FileAuditLog;
use tollgate_orchestrator::gateway::PodmanBuilder;
use tollgate_orchestrator::lock::{LockError, RunLock};
use tollgate_orchestrator::policy::PolicyEngine;
use tollgate_orchestrator::scanner::RegexSecretScanner;
use tollgate_orchestrator::{DeploymentPipeline, OrchestratorConfig, PipelineSettings, RunOptions};
use tracing::warn;

use super::{EXIT_BUSY, EXIT_FAILED, EXIT_USAGE};

/// Arguments of `tollgate run`
#[derive(Args)]
pub struct RunArgs {
    /// Branch the deployment is requested from
    #[arg(long, env = "TOLLGATE_BRANCH")]
    branch: String,

    /// Image to deploy as REPO[:TAG][=USER]; repeatable
    #[arg(long = "image", value_name = "REPO[:TAG][=USER]")]
    images: Vec<String>,

    /// Commit being deployed
    #[arg(long, env = "TOLLGATE_COMMIT", default_value = "")]
    commit: String,

    /// Tag for images given without one (default: short commit, else `latest`)
    #[arg(long)]
    tag: Option<String>,

    /// Build, scan and gate without pushing
    #[arg(long)]
    dry_run: bool,

    /// Source tree to scan for secrets
    #[arg(long, default_value = ".")]
    source: PathBuf,

    /// Build context root
    #[arg(long, default_value = ".")]
    context: PathBuf,

    /// Directory for build logs
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Print the run as JSON instead of a report
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn default_tag(&self) -> String {
        match &self.tag {
            Some(tag) => tag.clone(),
            None if !self.commit.is_empty() => self.commit.chars().take(7).collect(),
            None => "latest".to_string(),
        }
    }
}

/// Handle `tollgate run`
pub async fn handle_run(args: RunArgs, config: &OrchestratorConfig) -> Result<ExitCode> {
    let tag = args.default_tag();

    let mut images = Vec::with_capacity(args.images.len());
    for input in &args.images {
        match ImageRef::parse_with_default_tag(input, &tag) {
            Ok(image) => images.push(image),
            Err(e) => {
                eprintln!("{} {}", "Invalid image:".red().bold(), e);
                return Ok(ExitCode::from(EXIT_USAGE));
            }
        }
    }

    let request = DeploymentRequest::new(args.branch.clone(), args.commit.clone(), tag, images);

    let _lock = match RunLock::acquire(&config.lock_file_path) {
        Ok(lock) => lock,
        Err(LockError::Busy { path, holder }) => {
            let holder = holder.map(|pid| format!(" by pid {}", pid)).unwrap_or_default();
            eprintln!(
                "{} a deployment is already running (lock {}{})",
                "Busy:".yellow().bold(),
                path.display(),
                holder
            );
            return Ok(ExitCode::from(EXIT_BUSY));
        }
        Err(e) => {
            return Err(e).with_context(|| {
                format!("failed to take {}", config.lock_file_path.display())
            });
        }
    };

    let mut builder = PodmanBuilder::new(&args.context);
    if let Some(dir) = &args.log_dir {
        builder = builder.with_log_dir(dir);
    }

    let pipeline = DeploymentPipeline::new(
        PolicyEngine::new(config.policy()),
        Arc::new(builder),
        Arc::new(RegexSecretScanner::new(&args.source)),
        Arc::from(config.secret_store.build()),
        Arc::new(FileAuditLog::new(&config.audit_log_path)),
        PipelineSettings::from(config),
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling at the next stage");
            on_interrupt.cancel();
        }
    });

    let options = RunOptions {
        dry_run: args.dry_run,
        cancel,
    };

    let run = match pipeline.run(request, options).await {
        Ok(run) => run,
        Err(e) if e.is_busy() => {
            eprintln!("{} {}", "Busy:".yellow().bold(), e);
            return Ok(ExitCode::from(EXIT_BUSY));
        }
        Err(e) => return Err(e.into()),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print_run(&run);
    }

    Ok(if run.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILED)
    })
}

/// Print a finished run
fn print_run(run: &PipelineRun) {
    println!("{}", "Deployment:".bold());
    println!("  Run:      {}", run.id.to_string().cyan());
    println!("  Branch:   {}", run.request.branch());
    if !run.request.commit_sha().is_empty() {
        println!("  Commit:   {}", run.request.commit_sha().dimmed());
    }
    println!("  State:    {}", colorize_state(run.state));
    if run.dry_run {
        println!("  Mode:     {}", "dry run".yellow());
    }
    if let Some(ended) = run.ended_at {
        let seconds = ended.signed_duration_since(run.started_at).num_seconds();
        println!("  Duration: {}s", seconds);
    }

    if !run.builds.is_empty() {
        println!("\n{}", "Images:".bold());
        for build in &run.builds {
            let user = build.result.runtime_user.as_deref().unwrap_or("(unset)");
            println!(
                "  {} {}:{}  {}  user={}",
                "▸".cyan(),
                build.repository,
                build.tag,
                build.result.sha256.dimmed(),
                user
            );
        }
    }

    if let Some(scan) = &run.scan {
        println!("\n{}", "Secret scan:".bold());
        if scan.is_clean() {
            println!("  {} no findings", "✓".green());
        } else {
            for found in &scan.matches {
                println!("  {} {}:{} ({})", "✗".red(), found.path, found.line, found.rule);
            }
        }
    }

    if !run.pushes.is_empty() {
        println!("\n{}", "Pushes:".bold());
        for push in &run.pushes {
            let mark = if push.success { "✓".green() } else { "✗".red() };
            let digest = push.digest.as_deref().unwrap_or("");
            println!("  {} {}:{}  {}", mark, push.repository, push.tag, digest.dimmed());
        }
    }

    if !run.reasons.is_empty() {
        println!("\n{}", "Reasons:".bold());
        for reason in &run.reasons {
            println!("  {}", reason.red());
        }
    }
}

/// Colorize pipeline state for display
pub fn colorize_state(state: PipelineState) -> colored::ColoredString {
    let text = state.to_string();
    match state {
        PipelineState::Completed => text.green(),
        PipelineState::Failed => text.red(),
        PipelineState::Pending => text.dimmed(),
        _ => text.cyan(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        run: RunArgs,
    }

    fn parse(args: &[&str]) -> RunArgs {
        let mut argv = vec!["tollgate"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().run
    }

    #[test]
    fn test_default_tag() {
        let args = parse(&["--branch", "main", "--commit", "0a1b2c3d4e5f"]);
        assert_eq!(args.default_tag(), "0a1b2c3");

        let args = parse(&["--branch", "main", "--commit", "0a1b2c3d", "--tag", "v2"]);
        assert_eq!(args.default_tag(), "v2");

        let args = parse(&["--branch", "main"]);
        assert_eq!(args.default_tag(), "latest");
    }

    #[test]
    fn test_repeated_images() {
        let args = parse(&[
            "--branch",
            "main",
            "--image",
            "acme/backend:1=node",
            "--image",
            "acme/frontend",
            "--dry-run",
        ]);
        assert_eq!(args.images, vec!["acme/backend:1=node", "acme/frontend"]);
        assert!(args.dry_run);
    }
}
