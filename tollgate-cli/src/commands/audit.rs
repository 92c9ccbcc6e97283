//! Audit command
//!
//! Replays the audit log: every entry, or the entries and state path of a
//! single run.

use anyhow::{Context, Result, bail};
use clap::Args;
use colored::*;
use std::process::ExitCode;
use tollgate_core::domain::audit::{AuditEntry, AuditEvent, replay_states};
use tollgate_orchestrator::OrchestratorConfig;
use tollgate_orchestrator::audit::{AuditLog, FileAuditLog};
use uuid::Uuid;

use super::run::colorize_state;

/// Arguments of `tollgate audit`
#[derive(Args)]
pub struct AuditArgs {
    /// Run ID or unambiguous prefix
    #[arg(long)]
    run: Option<String>,

    /// Print raw JSON lines
    #[arg(long)]
    json: bool,
}

/// Handle `tollgate audit`
pub fn handle_audit(args: AuditArgs, config: &OrchestratorConfig) -> Result<ExitCode> {
    let log = FileAuditLog::new(&config.audit_log_path);
    let entries = log
        .entries()
        .and_then(|entries| entries.collect::<Result<Vec<_>, _>>())
        .with_context(|| format!("failed to read {}", config.audit_log_path.display()))?;

    let entries = match &args.run {
        Some(id) => {
            let run_id = resolve_run_id(&entries, id)?;
            entries
                .into_iter()
                .filter(|e| e.run_id == run_id)
                .collect()
        }
        None => entries,
    };

    if entries.is_empty() {
        println!("{}", "No audit entries found.".yellow());
        return Ok(ExitCode::SUCCESS);
    }

    if args.json {
        for entry in &entries {
            println!("{}", serde_json::to_string(entry)?);
        }
        return Ok(ExitCode::SUCCESS);
    }

    for entry in &entries {
        print_entry(entry);
    }

    if let Some(first) = entries.first().filter(|_| args.run.is_some()) {
        let path = replay_states(&entries, first.run_id)
            .into_iter()
            .map(|s| colorize_state(s).to_string())
            .collect::<Vec<_>>()
            .join(" → ");
        println!("\n{} {}", "States:".bold(), path);
    }

    Ok(ExitCode::SUCCESS)
}

/// Resolves a full run ID or a unique prefix of one
fn resolve_run_id(entries: &[AuditEntry], input: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(input) {
        return Ok(id);
    }

    let prefix = input.to_lowercase();
    let mut candidates: Vec<Uuid> = entries
        .iter()
        .map(|e| e.run_id)
        .filter(|id| id.to_string().starts_with(&prefix))
        .collect();
    candidates.sort();
    candidates.dedup();

    match candidates.as_slice() {
        [id] => Ok(*id),
        [] => bail!("no run matches '{}'", input),
        many => bail!("'{}' matches {} runs, use a longer prefix", input, many.len()),
    }
}

fn print_entry(entry: &AuditEntry) {
    let time = entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string();
    let run = entry.run_id.to_string()[..8].to_string();

    let detail = match &entry.event {
        AuditEvent::Transition { from, to, reasons } => {
            let mut line = format!("{} → {}", from, colorize_state(*to));
            if !reasons.is_empty() {
                line.push_str(&format!(" ({})", reasons.join(", ")));
            }
            line
        }
        AuditEvent::Decision { allowed, reasons } => {
            if *allowed {
                format!("gate {}", "allowed".green())
            } else {
                format!("gate {} ({})", "denied".red(), reasons.join(", "))
            }
        }
        AuditEvent::ImageBuilt {
            repository,
            tag,
            sha256,
        } => format!("built {}:{} {}", repository, tag, sha256.dimmed()),
        AuditEvent::ImagePushed {
            repository,
            tag,
            success,
            digest,
        } => {
            let mark = if *success { "✓".green() } else { "✗".red() };
            format!(
                "pushed {}:{} {} {}",
                repository,
                tag,
                mark,
                digest.as_deref().unwrap_or("").dimmed()
            )
        }
    };

    println!("{} {} {}", time.dimmed(), run.cyan(), detail);
}
