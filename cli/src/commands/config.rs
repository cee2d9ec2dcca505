// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use prgate_core::domain::config::{GatewayConfigManifest, SecretString, CONFIG_PATH_ENV};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective manifest as YAML (secrets masked)
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./prgate-config.yaml)
        #[arg(short, long, default_value = "./prgate-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(&output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let config = GatewayConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./prgate-config.yaml");
        println!("  4. ~/.prgate/config.yaml");
        println!("  5. /etc/prgate/config.yaml");
        println!();
    }

    if as_yaml {
        print!("{}", config.to_yaml_string()?);
        return Ok(());
    }

    println!("{}", "Current configuration:".bold());
    println!();

    let limits = &config.spec.limits;
    println!("{}", "Limits:".bold());
    println!("  Max changed files: {}", limits.max_changed_files);
    println!("  Max patch lines: {}", limits.max_patch_lines);
    println!("  Command timeout: {}s", limits.command_timeout_seconds);
    println!();

    let ws = &config.spec.workspace;
    println!("{}", "Workspaces:".bold());
    println!(
        "  TTL: {} min (range {}..={})",
        ws.ttl_minutes_default, ws.ttl_minutes_min, ws.ttl_minutes_max
    );
    println!("  Approval TTL: {} min", ws.approval_ttl_minutes);
    println!();

    let github = &config.spec.github;
    println!("{}", "GitHub:".bold());
    if github.username.is_empty() {
        println!("  Username: {}", "(not set)".yellow());
    } else {
        println!("  Username: {}", github.username);
    }
    println!("  Allowed repos:");
    for repo in config.allowed_repos() {
        println!("    - {}", repo);
    }
    println!("  Token: {}", describe_secret(github.token.as_ref()));
    println!();

    let sandbox = &config.spec.sandbox;
    println!("{}", "Sandbox:".bold());
    println!("  API URL: {}", sandbox.api_url);
    println!("  API key: {}", describe_secret(sandbox.api_key.as_ref()));
    if let Some(template) = &sandbox.template {
        println!("  Template: {}", template);
    }
    println!("  Home: {}", sandbox.home_dir);
    println!();

    Ok(())
}

fn describe_secret(secret: Option<&SecretString>) -> String {
    match secret {
        None => "(not set)".dimmed().to_string(),
        Some(secret) => match (secret.env_reference(), secret.resolve()) {
            (Some(var), Some(_)) => format!("from ${var}").green().to_string(),
            (Some(var), None) => format!("${var} is unset").yellow().to_string(),
            (None, _) => "(literal)".green().to_string(),
        },
    }
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = GatewayConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn sample(with_examples: bool) -> &'static str {
    if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    }
}

async fn generate(output: &Path, with_examples: bool) -> Result<()> {
    std::fs::write(output, sample(with_examples))
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
