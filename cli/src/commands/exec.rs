// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! One-shot remote execution
//!
//! Provisions a workspace on the configured sandbox service, optionally
//! clones an allowlisted repository into it, runs a single validated command
//! and tears the workspace down again, whatever the outcome.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use prgate_core::domain::config::GatewayConfigManifest;
use prgate_core::infrastructure::backend::RemoteSandboxProvisioner;
use prgate_core::Gateway;

#[derive(Args)]
pub struct ExecArgs {
    /// Command line to run inside the workspace
    #[arg(value_name = "COMMAND")]
    pub command: String,

    /// Trust mode (safe, expert)
    #[arg(short, long, default_value = "safe")]
    pub mode: String,

    /// Working directory, relative to the workspace
    #[arg(long)]
    pub cwd: Option<String>,

    /// Command timeout in seconds (capped by configuration)
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Workspace TTL in minutes
    #[arg(long)]
    pub ttl: Option<u32>,

    /// GitHub HTTPS URL to clone before running the command
    #[arg(long, value_name = "URL")]
    pub repo: Option<String>,
}

pub async fn execute(args: ExecArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = GatewayConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    let provisioner = Arc::new(RemoteSandboxProvisioner::from_config(&config));
    let gateway = Gateway::new(config, provisioner).context("Configuration validation failed")?;

    let workspace = gateway
        .create_workspace("code", args.ttl)
        .await
        .context("Failed to create workspace")?;
    let workspace_id = workspace.workspace_id.to_string();
    info!(workspace_id = %workspace_id, "Workspace ready");

    let outcome = run_in_workspace(&gateway, &workspace_id, &args).await;
    gateway.shutdown().await;
    let exit_code = outcome?;

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

async fn run_in_workspace(gateway: &Gateway, workspace_id: &str, args: &ExecArgs) -> Result<i32> {
    if let Some(url) = &args.repo {
        let cloned = gateway
            .clone_repo(workspace_id, url)
            .await
            .context("Failed to clone repository")?;
        eprintln!(
            "{}",
            format!("Cloned {} ({} @ {})", url, cloned.default_branch, cloned.head_sha).dimmed()
        );
    }

    let result = gateway
        .run_command(
            workspace_id,
            &args.command,
            args.cwd.as_deref(),
            args.timeout,
            &args.mode,
        )
        .await?;

    print!("{}", result.stdout);
    eprint!("{}", result.stderr);

    let status = format!(
        "exit {} in {}ms (run {})",
        result.exit_code, result.duration_ms, result.run_id
    );
    if result.timed_out {
        eprintln!("{}", format!("✗ Timed out: {status}").red());
    } else if result.succeeded() {
        eprintln!("{}", format!("✓ {status}").green());
    } else {
        eprintln!("{}", format!("✗ {status}").yellow());
    }

    Ok(result.exit_code)
}
