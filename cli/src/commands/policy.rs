// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Offline policy commands
//!
//! Commands: check, normalize, redact. None of them provision a workspace.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::io::{Read, Write};
use std::path::PathBuf;

use prgate_core::domain::command_policy::{CommandValidator, TrustMode};
use prgate_core::domain::config::GatewayConfigManifest;
use prgate_core::domain::path_sanitizer::PathConfinement;
use prgate_core::domain::redaction::SecretRedactor;

#[derive(Args)]
pub struct CheckArgs {
    /// Command line to validate
    #[arg(value_name = "COMMAND")]
    pub command: String,

    /// Trust mode (safe, expert)
    #[arg(short, long, default_value = "safe")]
    pub mode: String,

    /// Working directory, relative to the workspace
    #[arg(long)]
    pub cwd: Option<String>,
}

#[derive(Args)]
pub struct NormalizeArgs {
    /// Path to normalise
    #[arg(value_name = "PATH")]
    pub path: String,

    /// Treat PATH as a repository-relative file instead of a working directory
    #[arg(long)]
    pub file: bool,
}

#[derive(Args)]
pub struct RedactArgs {
    /// Additional secret literal to scrub (repeatable)
    #[arg(short, long = "secret", value_name = "SECRET")]
    pub secrets: Vec<String>,
}

pub fn check(args: CheckArgs) -> Result<()> {
    let mode: TrustMode = args.mode.parse()?;
    let validated = CommandValidator::default().validate(&args.command, args.cwd.as_deref(), mode)?;

    println!("{}", format!("✓ Allowed in {mode} mode").green());
    println!("  argv: {:?}", validated.argv);
    println!("  cwd:  {}", validated.cwd);
    Ok(())
}

pub fn normalize(args: NormalizeArgs) -> Result<()> {
    let confinement = PathConfinement::new();
    let resolved = if args.file {
        confinement.resolve_file(&args.path)?
    } else {
        confinement.normalize(Some(&args.path))?
    };
    println!("{resolved}");
    Ok(())
}

/// Filter stdin to stdout, scrubbing configured and given secrets.
pub fn redact(args: RedactArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = GatewayConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    let redactor = SecretRedactor::new(config.secret_literals().into_iter().chain(args.secrets));

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read stdin")?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(redactor.redact(&input).as_bytes())?;
    stdout.flush()?;
    Ok(())
}
