// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Service
//!
//! Privileged git workflows: clone, fork/upstream remote setup, branch
//! management, diff and commit. Every command goes through the registry's
//! internal git door, so the run slot, confinement and redaction still apply.
//! Push is the one approval-gated operation here.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Repository setup and publishing on top of [`WorkspaceRegistry`]

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::approval_ledger::ApprovalLedger;
use crate::application::workspace_registry::{CommandResult, WorkspaceRegistry};
use crate::domain::approval::GatedAction;
use crate::domain::command_policy::validate_branch_name;
use crate::domain::errors::{GatewayError, GatewayResult};
use crate::domain::repo_policy::{repo_slug_from_url, RepoPolicy};
use crate::domain::workspace::WorkspaceId;

/// The only remote a push may target.
pub const PUSH_REMOTE: &str = "origin";

const PR_TEMPLATE_PATH: &str = ".github/pull_request_template.md";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneResult {
    pub repo_path: String,
    pub default_branch: String,
    pub head_sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub unified_diff: String,
    pub files_changed: usize,
    pub insertions: usize,
    pub deletions: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResult {
    pub committed: bool,
    pub commit_sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResult {
    pub pushed: bool,
    pub remote_branch: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrTemplate {
    pub exists: bool,
    pub template: String,
}

pub struct RepoService {
    registry: Arc<WorkspaceRegistry>,
    ledger: Arc<ApprovalLedger>,
    policy: RepoPolicy,
}

impl RepoService {
    pub fn new(
        registry: Arc<WorkspaceRegistry>,
        ledger: Arc<ApprovalLedger>,
        policy: RepoPolicy,
    ) -> Self {
        Self {
            registry,
            ledger,
            policy,
        }
    }

    pub fn policy(&self) -> &RepoPolicy {
        &self.policy
    }

    async fn git(
        &self,
        ws: &WorkspaceId,
        args: &[&str],
        cwd: Option<&str>,
    ) -> GatewayResult<CommandResult> {
        let argv: Vec<String> = std::iter::once("git")
            .chain(args.iter().copied())
            .map(String::from)
            .collect();
        self.registry.run_internal_git(ws, &argv, cwd).await
    }

    /// Run a git step whose failure aborts the workflow. Output is already
    /// redacted by the registry.
    async fn git_checked(
        &self,
        ws: &WorkspaceId,
        args: &[&str],
        step: &str,
    ) -> GatewayResult<CommandResult> {
        let result = self.git(ws, args, None).await?;
        if !result.succeeded() {
            warn!(workspace_id = %ws, step = %step, exit_code = result.exit_code, "Git step failed");
            return Err(GatewayError::Infrastructure(format!(
                "{step} failed (exit {}): {}",
                result.exit_code,
                result.stderr.trim()
            )));
        }
        Ok(result)
    }

    fn repo_root(&self) -> &str {
        self.registry.confinement().root()
    }

    fn allowed_upstream_slug(&self, url: &str) -> GatewayResult<String> {
        let slug = repo_slug_from_url(url).ok_or_else(|| {
            GatewayError::PolicyViolation(format!(
                "'{url}' is not a GitHub HTTPS repository URL"
            ))
        })?;
        if !self.policy.upstream_allowed(&slug) {
            warn!(repo = %slug, "Repository rejected by allowlist");
            return Err(GatewayError::PolicyViolation(format!(
                "Repository '{slug}' is not in the allowlist"
            )));
        }
        Ok(slug)
    }

    async fn clone_into_root(&self, ws: &WorkspaceId, url: &str) -> GatewayResult<()> {
        let root = self.repo_root().to_string();
        let result = self.git(ws, &["clone", url, root.as_str()], Some(".")).await?;
        if !result.succeeded() {
            return Err(GatewayError::Infrastructure(format!(
                "Failed to clone repository: {}",
                result.stderr
            )));
        }
        Ok(())
    }

    /// Clone an allowlisted repository into the confinement root.
    pub async fn clone_repo(&self, ws: &WorkspaceId, url: &str) -> GatewayResult<CloneResult> {
        let slug = self.allowed_upstream_slug(url)?;
        self.clone_into_root(ws, url).await?;

        let branch = self.git(ws, &["symbolic-ref", "--short", "HEAD"], None).await?;
        let default_branch = match branch.stdout.trim() {
            detected if branch.succeeded() && !detected.is_empty() => detected.to_string(),
            _ => "main".to_string(),
        };

        let head = self.git(ws, &["rev-parse", "--short=12", "HEAD"], None).await?;

        info!(workspace_id = %ws, repo = %slug, branch = %default_branch, "Repository cloned");
        Ok(CloneResult {
            repo_path: self.repo_root().to_string(),
            default_branch,
            head_sha: head.stdout.trim().to_string(),
        })
    }

    /// Clone the caller's fork and track `upstream/<base_branch>`.
    pub async fn setup_remotes(
        &self,
        ws: &WorkspaceId,
        fork_url: &str,
        upstream_url: &str,
        base_branch: &str,
    ) -> GatewayResult<CloneResult> {
        let upstream = self.allowed_upstream_slug(upstream_url)?;
        let fork = repo_slug_from_url(fork_url).ok_or_else(|| {
            GatewayError::PolicyViolation(format!(
                "'{fork_url}' is not a GitHub HTTPS repository URL"
            ))
        })?;
        if !self.policy.fork_allowed(&fork, Some(&upstream)) {
            warn!(fork = %fork, upstream = %upstream, "Fork rejected by allowlist");
            return Err(GatewayError::PolicyViolation(format!(
                "Fork '{fork}' is not permitted for user '{}'",
                self.policy.username()
            )));
        }
        validate_branch_name(base_branch)?;

        self.clone_into_root(ws, fork_url).await?;
        self.git_checked(ws, &["remote", "add", "upstream", upstream_url], "Adding upstream remote")
            .await?;
        self.git_checked(ws, &["fetch", "upstream"], "Fetching upstream")
            .await?;
        let tracking = format!("upstream/{base_branch}");
        self.git_checked(
            ws,
            &["checkout", "-B", base_branch, tracking.as_str()],
            "Checking out base branch",
        )
        .await?;
        let head = self.git(ws, &["rev-parse", "--short=12", "HEAD"], None).await?;

        info!(workspace_id = %ws, fork = %fork, upstream = %upstream, "Remotes configured");
        Ok(CloneResult {
            repo_path: self.repo_root().to_string(),
            default_branch: base_branch.to_string(),
            head_sha: head.stdout.trim().to_string(),
        })
    }

    pub async fn list_branches(&self, ws: &WorkspaceId, all: bool) -> GatewayResult<Vec<String>> {
        let args: &[&str] = if all { &["branch", "-a"] } else { &["branch"] };
        let result = self.git(ws, args, None).await?;
        Ok(parse_branch_list(&result.stdout))
    }

    /// Branches containing any of `patterns`, de-duplicated in first-seen order.
    pub async fn find_existing_branches(
        &self,
        ws: &WorkspaceId,
        patterns: &[String],
    ) -> GatewayResult<Vec<String>> {
        let branches = self.list_branches(ws, true).await?;
        let mut matches: Vec<String> = Vec::new();
        for pattern in patterns {
            for branch in &branches {
                if branch.contains(pattern.as_str()) && !matches.contains(branch) {
                    matches.push(branch.clone());
                }
            }
        }
        Ok(matches)
    }

    pub async fn add_remote(&self, ws: &WorkspaceId, name: &str, url: &str) -> GatewayResult<bool> {
        validate_branch_name(name)?;
        self.allowed_upstream_slug(url)?;
        let result = self.git(ws, &["remote", "add", name, url], None).await?;
        Ok(result.succeeded())
    }

    pub async fn fetch(&self, ws: &WorkspaceId, remote: &str) -> GatewayResult<bool> {
        validate_branch_name(remote)?;
        let result = self.git(ws, &["fetch", remote], None).await?;
        Ok(result.succeeded())
    }

    pub async fn checkout(&self, ws: &WorkspaceId, reference: &str) -> GatewayResult<bool> {
        validate_branch_name(reference)?;
        let result = self.git(ws, &["checkout", reference], None).await?;
        Ok(result.succeeded())
    }

    /// Create `name` from `from_ref`. Returns false if it already exists.
    pub async fn create_branch(
        &self,
        ws: &WorkspaceId,
        name: &str,
        from_ref: &str,
    ) -> GatewayResult<bool> {
        validate_branch_name(name)?;
        validate_branch_name(from_ref)?;

        let existing = self.git(ws, &["branch", "--list", name], None).await?;
        if parse_branch_list(&existing.stdout).iter().any(|b| b == name) {
            return Ok(false);
        }

        self.git_checked(ws, &["checkout", from_ref], "Checking out start point")
            .await?;
        let created = self.git(ws, &["checkout", "-b", name], None).await?;
        Ok(created.succeeded())
    }

    pub async fn diff(&self, ws: &WorkspaceId) -> GatewayResult<DiffSummary> {
        let diff = self.git(ws, &["diff", "-U3"], None).await?;
        let names = self.git(ws, &["diff", "--name-only"], None).await?;

        let lines = diff.stdout.lines();
        let (mut insertions, mut deletions) = (0, 0);
        for line in lines {
            if line.starts_with('+') && !line.starts_with("+++") {
                insertions += 1;
            } else if line.starts_with('-') && !line.starts_with("---") {
                deletions += 1;
            }
        }

        Ok(DiffSummary {
            files_changed: names.stdout.lines().filter(|l| !l.trim().is_empty()).count(),
            unified_diff: diff.stdout,
            insertions,
            deletions,
        })
    }

    /// Stage everything and commit.
    pub async fn commit(&self, ws: &WorkspaceId, message: &str) -> GatewayResult<CommitResult> {
        self.git_checked(ws, &["add", "-A"], "Staging changes").await?;
        let commit = self.git(ws, &["commit", "-m", message], None).await?;
        let head = self.git(ws, &["rev-parse", "--short=12", "HEAD"], None).await?;
        Ok(CommitResult {
            committed: commit.succeeded(),
            commit_sha: head.stdout.trim().to_string(),
        })
    }

    pub async fn read_pr_template(&self, ws: &WorkspaceId) -> GatewayResult<PrTemplate> {
        let workspace = self.registry.get(ws).await?;
        let path = self.registry.confinement().resolve_file(PR_TEMPLATE_PATH)?;
        Ok(match workspace.backend().read_text(&path).await {
            Ok(content) => PrTemplate {
                exists: true,
                template: self.registry.redactor().redact(&content),
            },
            Err(_) => PrTemplate {
                exists: false,
                template: String::new(),
            },
        })
    }

    /// Push `HEAD` to `origin`, consuming the approval's push action once the
    /// run slot is held.
    pub async fn push(
        &self,
        ws: &WorkspaceId,
        remote: &str,
        branch: Option<&str>,
        approval_id: Option<&str>,
    ) -> GatewayResult<PushResult> {
        if remote != PUSH_REMOTE {
            warn!(workspace_id = %ws, remote = %remote, "Push to non-origin remote rejected");
            return Err(GatewayError::PolicyViolation(format!(
                "Only pushing to '{PUSH_REMOTE}' (fork) is allowed. Attempted to push to '{remote}'."
            )));
        }
        let branch = branch.filter(|b| !b.is_empty());
        if let Some(branch) = branch {
            validate_branch_name(branch)?;
        }

        let result = self
            .registry
            .run_git_push(ws, branch, || {
                let approved = approval_id
                    .is_some_and(|id| self.ledger.consume(id, GatedAction::Push.as_str()));
                if approved {
                    Ok(())
                } else {
                    Err(GatewayError::ApprovalDenied(
                        "A valid approval_id is required to push changes".to_string(),
                    ))
                }
            })
            .await?;
        let remote_branch = format!("{PUSH_REMOTE}/{}", branch.unwrap_or("HEAD"));
        info!(
            workspace_id = %ws,
            remote_branch = %remote_branch,
            exit_code = result.exit_code,
            "Push completed"
        );
        Ok(PushResult {
            pushed: result.succeeded(),
            remote_branch,
            stderr: result.stderr,
        })
    }
}

fn parse_branch_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(|line| line.trim().trim_start_matches('*').trim())
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}
