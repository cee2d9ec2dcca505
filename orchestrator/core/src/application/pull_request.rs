// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Pull Request Gate
//!
//! The GitHub client lives outside this crate and is reached through
//! [`PullRequestClient`]. This module holds the draft type and the checks a
//! draft must pass before an `open_pr` approval is spent on it.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Approval-gated pull request creation

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::domain::command_policy::validate_branch_name;
use crate::domain::errors::GatewayError;
use crate::domain::repo_policy::RepoPolicy;

static AUTO_CLOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(closes|fixes|resolves)\s+#\d+").expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestDraft {
    pub upstream_repo: String,
    pub base_branch: String,
    pub fork_repo: String,
    pub head_branch: String,
    pub title: String,
    pub body: String,
    #[serde(default = "default_draft")]
    pub draft: bool,
}

fn default_draft() -> bool {
    true
}

impl PullRequestDraft {
    /// `owner:branch` head reference for a cross-repository pull request.
    pub fn head_ref(&self) -> String {
        let owner = self.fork_repo.split('/').next().unwrap_or_default();
        format!("{owner}:{}", self.head_branch)
    }

    /// Checks that do not depend on any approval.
    pub fn validate(&self, policy: &RepoPolicy) -> Result<(), GatewayError> {
        if !policy.upstream_allowed(&self.upstream_repo) {
            return Err(GatewayError::PolicyViolation(format!(
                "Repository '{}' is not in the allowlist",
                self.upstream_repo
            )));
        }

        let fork_owner = match self.fork_repo.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => owner,
            _ => {
                return Err(GatewayError::PolicyViolation(format!(
                    "Invalid fork repository slug: {}",
                    self.fork_repo
                )))
            }
        };
        if !fork_owner.eq_ignore_ascii_case(policy.username()) {
            return Err(GatewayError::PolicyViolation(format!(
                "Fork owner '{fork_owner}' does not match configured GitHub username '{}'. \
                 Pull requests can only be opened from your own fork.",
                policy.username()
            )));
        }

        validate_branch_name(&self.head_branch)?;
        validate_branch_name(&self.base_branch)?;

        if self.title.trim().is_empty() {
            return Err(GatewayError::PolicyViolation(
                "Pull request title cannot be empty".to_string(),
            ));
        }
        if AUTO_CLOSE.is_match(&self.body) {
            return Err(GatewayError::PolicyViolation(
                "Pull request body contains auto-close keywords (closes/fixes/resolves #N). \
                 Use 'Related to #N' instead."
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub number: u64,
    pub url: String,
}

/// Opens pull requests against the hosting service.
#[async_trait]
pub trait PullRequestClient: Send + Sync {
    async fn open_pull_request(&self, draft: &PullRequestDraft) -> anyhow::Result<PullRequestInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> PullRequestDraft {
        PullRequestDraft {
            upstream_repo: "acme/widgets".to_string(),
            base_branch: "main".to_string(),
            fork_repo: "bot/widgets".to_string(),
            head_branch: "fix/parser".to_string(),
            title: "Fix parser".to_string(),
            body: "Related to #12".to_string(),
            draft: true,
        }
    }

    fn policy() -> RepoPolicy {
        RepoPolicy::new("bot", ["acme/widgets"])
    }

    #[test]
    fn test_head_ref() {
        assert_eq!(draft().head_ref(), "bot:fix/parser");
    }

    #[test]
    fn test_valid_draft() {
        assert!(draft().validate(&policy()).is_ok());
    }

    #[test]
    fn test_rejections() {
        let mut d = draft();
        d.upstream_repo = "other/repo".to_string();
        assert!(d.validate(&policy()).is_err());

        let mut d = draft();
        d.fork_repo = "mallory/widgets".to_string();
        assert!(d.validate(&policy()).is_err());

        let mut d = draft();
        d.fork_repo = "bot".to_string();
        assert!(d.validate(&policy()).is_err());

        let mut d = draft();
        d.body = "This Fixes #12".to_string();
        assert!(d.validate(&policy()).is_err());

        let mut d = draft();
        d.head_branch = "--force".to_string();
        assert!(d.validate(&policy()).is_err());
    }
}
