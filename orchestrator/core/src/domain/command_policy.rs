// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Command Policy
//!
//! Decides, before anything executes, whether a command line may run inside a
//! workspace. Commands are split into an argument vector with shell-word
//! semantics and are never handed to a shell.
//!
//! Two doors exist:
//!
//! - [`CommandValidator::validate`] for caller-supplied command lines, gated
//!   by [`TrustMode`], an executable allowlist, metacharacter and substring
//!   denylists, an installer sub-policy and a git sub-policy.
//! - [`CommandValidator::validate_internal_git`] for argument vectors built by
//!   the gateway's own repository operations. It admits a separate set of git
//!   subcommands and still forbids shell metacharacters.
//!
//! `git push` and `git apply` are only ever produced by [`push_argv`] and
//! [`apply_argv`], which take no subcommand input.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Allow/deny decisions for command execution

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::domain::errors::GatewayError;
use crate::domain::path_sanitizer::PathConfinement;

/// Executables permitted in safe mode. Matched as prefixes of the first token.
pub const SAFE_PREFIXES: &[&str] = &["git", "python", "pytest", "ruff", "mypy", "uv", "pip"];

/// Additional executables permitted in expert mode.
pub const EXPERT_EXTRA_PREFIXES: &[&str] = &["pre-commit"];

/// Chaining, redirection and substitution sequences.
pub const FORBIDDEN_SEQUENCES: &[&str] = &[";", "&&", "||", "|", "`", "$(", ">", "<"];

pub const FORBIDDEN_SUBSTRINGS: &[&str] = &["sudo", "rm -rf", "curl", "bash", "wget", "ssh"];

/// Git subcommands reachable through `run_command` in safe mode.
pub const SAFE_GIT_SUBCOMMANDS: &[&str] =
    &["status", "diff", "checkout", "branch", "commit", "log", "fetch"];

/// Git subcommands reachable through the internal repository door.
pub const INTERNAL_GIT_SUBCOMMANDS: &[&str] = &[
    "clone",
    "remote",
    "rev-parse",
    "symbolic-ref",
    "checkout",
    "branch",
    "fetch",
    "log",
    "diff",
    "status",
    "add",
    "commit",
    "show",
];

const SAFE_INSTALLER_BLOCKED_FLAGS: &[&str] = &[
    "--index-url",
    "--extra-index-url",
    "-i",
    "--trusted-host",
    "--find-links",
    "-f",
];

/// Command trust level. Expert admits a strict superset of safe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustMode {
    #[default]
    Safe,
    Expert,
}

impl TrustMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Expert => "expert",
        }
    }

    fn allows_executable(&self, first: &str) -> bool {
        let extra: &[&str] = match self {
            Self::Safe => &[],
            Self::Expert => EXPERT_EXTRA_PREFIXES,
        };
        SAFE_PREFIXES
            .iter()
            .chain(extra.iter())
            .any(|prefix| first.starts_with(prefix))
    }
}

impl fmt::Display for TrustMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustMode {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "safe" => Ok(Self::Safe),
            "expert" => Ok(Self::Expert),
            _ => Err(GatewayError::PolicyViolation(
                "mode must be 'safe' or 'expert'".to_string(),
            )),
        }
    }
}

/// An argument vector and working directory that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedCommand {
    pub argv: Vec<String>,
    pub cwd: String,
}

#[derive(Debug, Clone, Default)]
pub struct CommandValidator {
    confinement: PathConfinement,
}

impl CommandValidator {
    pub fn new(confinement: PathConfinement) -> Self {
        Self { confinement }
    }

    pub fn confinement(&self) -> &PathConfinement {
        &self.confinement
    }

    /// Validate a caller-supplied command line.
    pub fn validate(
        &self,
        command: &str,
        cwd: Option<&str>,
        mode: TrustMode,
    ) -> Result<ValidatedCommand, GatewayError> {
        let tokens = shell_words::split(command).map_err(|e| {
            deny(format!("Failed to parse command '{command}': {e}"))
        })?;

        let Some(first) = tokens.first() else {
            return Err(deny("Empty command is not allowed".to_string()));
        };

        if !mode.allows_executable(first) {
            return Err(deny(format!("Command '{command}' is not allowed in {mode} mode")));
        }

        if let Some(seq) = FORBIDDEN_SEQUENCES.iter().find(|seq| command.contains(*seq)) {
            return Err(deny(format!(
                "Command '{command}' contains forbidden sequence '{seq}'"
            )));
        }

        if let Some(word) = FORBIDDEN_SUBSTRINGS.iter().find(|word| command.contains(*word)) {
            return Err(deny(format!(
                "Command '{command}' contains forbidden substring '{word}'"
            )));
        }

        check_installer(&tokens, mode)?;
        check_git(&tokens, mode)?;

        let cwd = self.confinement.normalize(cwd)?;
        Ok(ValidatedCommand { argv: tokens, cwd })
    }

    /// Validate an argument vector built by a repository operation.
    ///
    /// `clone` runs from the workspace root so it can create the repository
    /// directory; everything else is confined like a caller command.
    pub fn validate_internal_git(
        &self,
        argv: &[String],
        cwd: Option<&str>,
    ) -> Result<ValidatedCommand, GatewayError> {
        if argv.len() < 2 {
            return Err(deny(
                "Internal git commands require at least 'git <subcommand>'".to_string(),
            ));
        }
        if argv[0] != "git" {
            return Err(deny("Internal git runner only accepts git commands".to_string()));
        }

        let subcommand = argv[1].to_lowercase();
        if !INTERNAL_GIT_SUBCOMMANDS.contains(&subcommand.as_str()) {
            return Err(deny(format!(
                "git {subcommand} is not allowed via internal git runner"
            )));
        }

        for arg in argv {
            if let Some(seq) = FORBIDDEN_SEQUENCES.iter().find(|seq| arg.contains(*seq)) {
                return Err(deny(format!("Argument contains forbidden sequence '{seq}'")));
            }
        }

        let cwd = if subcommand == "clone" {
            ".".to_string()
        } else {
            match cwd {
                None | Some("") | Some(".") => self.confinement.root().to_string(),
                Some(path) => self.confinement.normalize(Some(path))?,
            }
        };

        Ok(ValidatedCommand {
            argv: argv.to_vec(),
            cwd,
        })
    }
}

fn deny(reason: String) -> GatewayError {
    warn!(reason = %reason, "Command rejected by policy");
    GatewayError::PolicyViolation(reason)
}

fn is_installer(tokens: &[String]) -> bool {
    let first = tokens[0].as_str();
    let is_pip = first.starts_with("pip")
        || (first.starts_with("python")
            && tokens.iter().any(|t| t == "-m")
            && tokens.iter().any(|t| t == "pip"));
    is_pip || first == "uv"
}

fn check_installer(tokens: &[String], mode: TrustMode) -> Result<(), GatewayError> {
    if !is_installer(tokens) {
        return Ok(());
    }

    if mode == TrustMode::Expert {
        if tokens.iter().any(|t| t.starts_with("--trusted-host")) {
            return Err(deny(
                "'--trusted-host' is not allowed even in expert mode".to_string(),
            ));
        }
        return Ok(());
    }

    for token in tokens {
        for flag in SAFE_INSTALLER_BLOCKED_FLAGS {
            if token == flag || token.starts_with(&format!("{flag}=")) {
                return Err(deny(format!(
                    "'{flag}' is not allowed in safe mode. Only standard package index installs are permitted."
                )));
            }
        }
        if token.starts_with("http://") || token.starts_with("https://") {
            return Err(deny(
                "Direct URL package installs are not allowed in safe mode".to_string(),
            ));
        }
        if token.starts_with("git+") {
            return Err(deny(
                "Git-based package installs (git+https://...) are not allowed in safe mode"
                    .to_string(),
            ));
        }
    }
    Ok(())
}

fn check_git(tokens: &[String], mode: TrustMode) -> Result<(), GatewayError> {
    if tokens[0] != "git" || tokens.len() < 2 {
        return Ok(());
    }

    let subcommand = tokens[1].to_lowercase();
    match subcommand.as_str() {
        "push" => {
            return Err(deny(
                "Direct 'git push' is not permitted; use the approval-gated push operation"
                    .to_string(),
            ))
        }
        "apply" => {
            return Err(deny(
                "Direct 'git apply' is not permitted; use the apply_patch operation".to_string(),
            ))
        }
        "clone" => {
            return Err(deny(
                "Direct 'git clone' is not permitted; use the repository clone operation"
                    .to_string(),
            ))
        }
        "remote" if tokens.get(2).is_some_and(|t| t.eq_ignore_ascii_case("set-url")) => {
            return Err(deny(
                "Changing remote URLs is not permitted via run_command".to_string(),
            ))
        }
        "config" | "reset" | "clean" => {
            return Err(deny(format!("git {subcommand} is not permitted via run_command")))
        }
        _ => {}
    }

    if mode == TrustMode::Safe && !SAFE_GIT_SUBCOMMANDS.contains(&subcommand.as_str()) {
        return Err(deny(format!("git {subcommand} is not allowed in safe mode")));
    }
    Ok(())
}

/// Check that `name` is a plain branch name that cannot be read as an option
/// or a refspec expression.
pub fn validate_branch_name(name: &str) -> Result<(), GatewayError> {
    let valid = !name.is_empty()
        && !name.starts_with('-')
        && !name.contains("..")
        && !name.ends_with('/')
        && !name.ends_with(".lock")
        && name.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.')
        });
    if valid {
        Ok(())
    } else {
        Err(deny(format!("Invalid branch name '{name}'")))
    }
}

/// Fixed argument vector for the approval-gated push. Always targets `origin`.
pub fn push_argv(branch: Option<&str>) -> Vec<String> {
    let refspec = match branch {
        Some(branch) if !branch.is_empty() => format!("HEAD:{branch}"),
        _ => "HEAD".to_string(),
    };
    vec!["git".into(), "push".into(), "origin".into(), refspec]
}

/// Fixed argument vector for applying a patch file relative to the repository root.
pub fn apply_argv(patch_path: &str) -> Vec<String> {
    vec![
        "git".into(),
        "apply".into(),
        "--whitespace=nowarn".into(),
        patch_path.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> CommandValidator {
        CommandValidator::default()
    }

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_git_status_allowed_in_safe_mode() {
        let cmd = validator().validate("git status", None, TrustMode::Safe).unwrap();
        assert_eq!(cmd.argv, argv(&["git", "status"]));
        assert_eq!(cmd.cwd, "repo");
    }

    #[test]
    fn test_quoting_is_honoured() {
        let cmd = validator()
            .validate(r#"git commit -m "fix the parser""#, Some("repo"), TrustMode::Safe)
            .unwrap();
        assert_eq!(cmd.argv, argv(&["git", "commit", "-m", "fix the parser"]));
    }

    #[test]
    fn test_unbalanced_quote_rejected() {
        let err = validator()
            .validate("python -c 'print(1)", None, TrustMode::Expert)
            .unwrap_err();
        assert!(matches!(err, GatewayError::PolicyViolation(msg) if msg.contains("Failed to parse")));
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(validator().validate("   ", None, TrustMode::Safe).is_err());
    }

    #[test]
    fn test_push_rejected_in_both_modes() {
        for mode in [TrustMode::Safe, TrustMode::Expert] {
            let err = validator()
                .validate("git push origin main", None, mode)
                .unwrap_err();
            assert!(err.to_string().contains("approval-gated push"), "{err}");
        }
    }

    #[test]
    fn test_unconditional_git_denials() {
        for cmd in [
            "git apply x.patch",
            "git clone https://github.com/a/b",
            "git remote set-url origin https://evil",
            "git config user.name x",
            "git reset --hard",
            "git clean -fdx",
            "git PUSH origin",
        ] {
            assert!(
                validator().validate(cmd, None, TrustMode::Expert).is_err(),
                "{cmd} should be rejected"
            );
        }
    }

    #[test]
    fn test_safe_git_allowlist() {
        assert!(validator().validate("git log --oneline", None, TrustMode::Safe).is_ok());
        assert!(validator().validate("git stash", None, TrustMode::Safe).is_err());
        assert!(validator().validate("git stash", None, TrustMode::Expert).is_ok());
        assert!(validator().validate("git remote -v", None, TrustMode::Expert).is_ok());
    }

    #[test]
    fn test_destructive_commands_rejected() {
        for mode in [TrustMode::Safe, TrustMode::Expert] {
            assert!(validator().validate("rm -rf /", None, mode).is_err());
            assert!(validator().validate("python -c 'import os' ; ls", None, mode).is_err());
            assert!(validator().validate("pytest | tee out", None, mode).is_err());
            assert!(validator().validate("python -m http.server > log", None, mode).is_err());
            assert!(validator().validate("python $(whoami)", None, mode).is_err());
            assert!(validator().validate("python -c 'import subprocess' sudo", None, mode).is_err());
            assert!(validator().validate("python curl.py", None, mode).is_err());
        }
    }

    #[test]
    fn test_executable_allowlist() {
        assert!(validator().validate("pre-commit run", None, TrustMode::Safe).is_err());
        assert!(validator().validate("pre-commit run", None, TrustMode::Expert).is_ok());
        assert!(validator().validate("make test", None, TrustMode::Expert).is_err());
        assert!(validator().validate("python3 -m pytest", None, TrustMode::Safe).is_ok());
    }

    #[test]
    fn test_pip_index_url_by_mode() {
        let cmd = "pip install --index-url https://x/simple pkg";
        assert!(validator().validate(cmd, None, TrustMode::Safe).is_err());
        assert!(validator().validate(cmd, None, TrustMode::Expert).is_ok());
    }

    #[test]
    fn test_trusted_host_rejected_in_both_modes() {
        let cmd = "pip install --trusted-host x pkg";
        assert!(validator().validate(cmd, None, TrustMode::Safe).is_err());
        assert!(validator().validate(cmd, None, TrustMode::Expert).is_err());
        assert!(validator()
            .validate("uv pip install --trusted-host=x pkg", None, TrustMode::Expert)
            .is_err());
    }

    #[test]
    fn test_safe_installer_rules() {
        let v = validator();
        assert!(v.validate("pip install -r requirements.txt", None, TrustMode::Safe).is_ok());
        assert!(v.validate("pip install -e .", None, TrustMode::Safe).is_ok());
        assert!(v.validate("uv sync --dev", None, TrustMode::Safe).is_ok());
        assert!(v.validate("pip install requests", None, TrustMode::Safe).is_ok());
        assert!(v.validate("pip install -i https://x pkg", None, TrustMode::Safe).is_err());
        assert!(v.validate("pip install --extra-index-url=https://x pkg", None, TrustMode::Safe).is_err());
        assert!(v.validate("pip install -f ./wheels pkg", None, TrustMode::Safe).is_err());
        assert!(v.validate("pip install https://x/pkg.whl", None, TrustMode::Safe).is_err());
        assert!(v.validate("pip install git+https://github.com/a/b", None, TrustMode::Safe).is_err());
        assert!(v.validate("python -m pip install git+https://github.com/a/b", None, TrustMode::Safe).is_err());
        assert!(v.validate("pip install git+https://github.com/a/b", None, TrustMode::Expert).is_ok());
    }

    #[test]
    fn test_cwd_is_confined() {
        let v = validator();
        assert_eq!(
            v.validate("pytest", Some("repo/tests"), TrustMode::Safe).unwrap().cwd,
            "repo/tests"
        );
        assert!(v.validate("pytest", Some("/tmp"), TrustMode::Safe).is_err());
        assert!(v.validate("pytest", Some("repo/../.."), TrustMode::Safe).is_err());
    }

    #[test]
    fn test_internal_git_door() {
        let v = validator();
        let clone = v
            .validate_internal_git(&argv(&["git", "clone", "https://github.com/a/b", "repo"]), Some("repo"))
            .unwrap();
        assert_eq!(clone.cwd, ".");

        let rev = v.validate_internal_git(&argv(&["git", "rev-parse", "HEAD"]), None).unwrap();
        assert_eq!(rev.cwd, "repo");

        assert!(v.validate_internal_git(&argv(&["git"]), None).is_err());
        assert!(v.validate_internal_git(&argv(&["python", "status"]), None).is_err());
        assert!(v.validate_internal_git(&argv(&["git", "push", "origin"]), None).is_err());
        assert!(v.validate_internal_git(&argv(&["git", "apply", "x"]), None).is_err());
        assert!(v
            .validate_internal_git(&argv(&["git", "commit", "-m", "a; rm"]), None)
            .is_err());
        assert!(v.validate_internal_git(&argv(&["git", "status"]), Some("/etc")).is_err());
    }

    #[test]
    fn test_fixed_argv_builders() {
        assert_eq!(push_argv(None), argv(&["git", "push", "origin", "HEAD"]));
        assert_eq!(
            push_argv(Some("fix/parser")),
            argv(&["git", "push", "origin", "HEAD:fix/parser"])
        );
        assert_eq!(
            apply_argv(".prgate/tmp.patch"),
            argv(&["git", "apply", "--whitespace=nowarn", ".prgate/tmp.patch"])
        );
    }

    #[test]
    fn test_branch_name_validation() {
        assert!(validate_branch_name("fix/issue-12").is_ok());
        assert!(validate_branch_name("release_1.2").is_ok());
        for bad in ["", "--force", "a..b", "has space", "x;y", "main.lock", "x:y", "a/"] {
            assert!(validate_branch_name(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_trust_mode_parse() {
        assert_eq!("Expert".parse::<TrustMode>().unwrap(), TrustMode::Expert);
        assert!("root".parse::<TrustMode>().is_err());
    }
}
