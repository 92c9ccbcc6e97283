//! Check command
//!
//! Verifies that a deployment could run: the builder is installed, the
//! registry secrets resolve and the audit log is readable. Secret values are
//! never printed.

use anyhow::Result;
use colored::*;
use std::process::ExitCode;
use tollgate_orchestrator::OrchestratorConfig;
use tollgate_orchestrator::audit::{AuditLog, FileAuditLog};
use tollgate_orchestrator::gateway::check_podman_available;

use super::EXIT_FAILED;

/// Handle `tollgate check`
pub async fn handle_check(config: &OrchestratorConfig) -> Result<ExitCode> {
    let mut healthy = true;

    println!("{}", "Checks:".bold());

    match check_podman_available().await {
        Ok(version) => pass("builder", &version),
        Err(e) => healthy &= fail("builder", &e.to_string()),
    }

    let store = config.secret_store.build();
    for name in [&config.registry_user_secret, &config.registry_password_secret] {
        match store.resolve(name) {
            Ok(secret) => pass(&format!("secret {}", name), &format!("from {}", secret.source())),
            Err(e) => healthy &= fail(&format!("secret {}", name), &e.to_string()),
        }
    }

    let audit = FileAuditLog::new(&config.audit_log_path);
    let count = audit
        .entries()
        .and_then(|entries| entries.collect::<Result<Vec<_>, _>>())
        .map(|entries| entries.len());
    match count {
        Ok(count) => pass(
            "audit log",
            &format!("{} ({} entries)", config.audit_log_path.display(), count),
        ),
        Err(e) => healthy &= fail("audit log", &e.to_string()),
    }

    if config.lock_file_path.exists() {
        println!(
            "  {} run lock {} is held",
            "!".yellow(),
            config.lock_file_path.display()
        );
    }

    Ok(if healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILED)
    })
}

fn pass(what: &str, detail: &str) {
    println!("  {} {:<24} {}", "✓".green(), what, detail.dimmed());
}

/// Prints a failed check; always returns `false`
fn fail(what: &str, detail: &str) -> bool {
    println!("  {} {:<24} {}", "✗".red(), what, detail.red());
    false
}
