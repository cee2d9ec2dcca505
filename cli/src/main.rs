// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # prgate CLI
//!
//! The `prgate` binary is the operator front end of the policy gateway.
//!
//! ## Commands
//!
//! - `prgate config show|validate|generate` - Configuration management
//! - `prgate check <COMMAND>` - Validate a command line without running it
//! - `prgate normalize <PATH>` - Resolve a path against the workspace confinement root
//! - `prgate redact` - Scrub secrets from stdin
//! - `prgate exec <COMMAND>` - Run one validated command in a fresh remote workspace

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use prgate::commands::{self, CheckArgs, ConfigCommand, ExecArgs, NormalizeArgs, RedactArgs};

/// prgate - policy gateway for agent-driven pull requests
#[derive(Parser)]
#[command(name = "prgate")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "PRGATE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "PRGATE_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Validate a command line against the command policy
    #[command(name = "check")]
    Check(CheckArgs),

    /// Resolve a path against the confinement root
    #[command(name = "normalize")]
    Normalize(NormalizeArgs),

    /// Redact secrets from stdin
    #[command(name = "redact")]
    Redact(RedactArgs),

    /// Run one command in a fresh remote workspace
    #[command(name = "exec")]
    Exec(ExecArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Check(args)) => commands::policy::check(args),
        Some(Commands::Normalize(args)) => commands::policy::normalize(args),
        Some(Commands::Redact(args)) => commands::policy::redact(args, cli.config),
        Some(Commands::Exec(args)) => commands::exec::execute(args, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
