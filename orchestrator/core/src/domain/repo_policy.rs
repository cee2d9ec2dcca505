// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository allowlist.
//!
//! Upstreams are allowed by exact slug, `owner/*` or a global wildcard.
//! Forks must live under the configured user and correspond to an allowed
//! upstream. All comparisons are case-insensitive.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static GITHUB_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://github\.com/([^/]+/[^/]+?)(?:\.git)?/?$").expect("valid regex")
});

/// Extract `owner/repo` from a GitHub HTTPS URL.
pub fn repo_slug_from_url(url: &str) -> Option<String> {
    GITHUB_URL
        .captures(url.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone, Default)]
pub struct RepoPolicy {
    username: String,
    allowed: HashSet<String>,
}

impl RepoPolicy {
    pub fn new<I, S>(username: impl Into<String>, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            username: username.into().trim().to_lowercase(),
            allowed: allowed
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    fn global_wildcard(&self) -> bool {
        self.allowed.contains("*") || self.allowed.contains("*/*")
    }

    pub fn upstream_allowed(&self, slug: &str) -> bool {
        let slug = slug.trim().to_lowercase();
        if self.global_wildcard() || self.allowed.contains(&slug) {
            return true;
        }
        match slug.split_once('/') {
            Some((owner, _)) => self.allowed.contains(&format!("{owner}/*")),
            None => false,
        }
    }

    /// Whether `fork_slug` may be used as the push target.
    ///
    /// An `owner/*` entry only admits the fork when `upstream_slug` is
    /// supplied and belongs to that owner with the same repository name.
    pub fn fork_allowed(&self, fork_slug: &str, upstream_slug: Option<&str>) -> bool {
        let fork = fork_slug.trim().to_lowercase();
        let Some((fork_owner, repo_name)) = fork.split_once('/') else {
            return false;
        };
        if self.username.is_empty() || fork_owner != self.username {
            return false;
        }
        if self.global_wildcard() {
            return true;
        }

        let exact_match = self
            .allowed
            .iter()
            .filter(|entry| !entry.ends_with("/*"))
            .filter_map(|entry| entry.split_once('/'))
            .any(|(_, allowed_repo)| allowed_repo == repo_name);
        if exact_match {
            return true;
        }

        let Some(upstream) = upstream_slug.map(|s| s.trim().to_lowercase()) else {
            return false;
        };
        match upstream.split_once('/') {
            Some((upstream_owner, upstream_repo)) => {
                upstream_repo == repo_name
                    && self.allowed.contains(&format!("{upstream_owner}/*"))
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_from_url() {
        assert_eq!(
            repo_slug_from_url("https://github.com/Acme/widgets.git").as_deref(),
            Some("Acme/widgets")
        );
        assert_eq!(
            repo_slug_from_url("https://github.com/acme/widgets").as_deref(),
            Some("acme/widgets")
        );
        assert_eq!(repo_slug_from_url("git@github.com:acme/widgets.git"), None);
        assert_eq!(repo_slug_from_url("https://gitlab.com/acme/widgets"), None);
    }

    #[test]
    fn test_upstream_allowed() {
        let policy = RepoPolicy::new("bot", ["Acme/Widgets", "tools/*"]);
        assert!(policy.upstream_allowed("acme/widgets"));
        assert!(policy.upstream_allowed("TOOLS/anything"));
        assert!(!policy.upstream_allowed("acme/other"));
        assert!(!policy.upstream_allowed("noslash"));

        let open = RepoPolicy::new("bot", ["*/*"]);
        assert!(open.upstream_allowed("any/thing"));
    }

    #[test]
    fn test_fork_requires_username() {
        let policy = RepoPolicy::new("bot", ["acme/widgets"]);
        assert!(policy.fork_allowed("bot/widgets", None));
        assert!(policy.fork_allowed("BOT/Widgets", None));
        assert!(!policy.fork_allowed("mallory/widgets", None));
        assert!(!policy.fork_allowed("bot/gadgets", None));
    }

    #[test]
    fn test_owner_wildcard_needs_matching_upstream() {
        let policy = RepoPolicy::new("bot", ["tools/*"]);
        assert!(!policy.fork_allowed("bot/anything", None));
        assert!(!policy.fork_allowed("bot/anything", Some("other/anything")));
        assert!(!policy.fork_allowed("bot/anything", Some("tools/different")));
        assert!(policy.fork_allowed("bot/anything", Some("tools/anything")));
    }

    #[test]
    fn test_global_wildcard_fork() {
        let policy = RepoPolicy::new("bot", ["*"]);
        assert!(policy.fork_allowed("bot/x", None));
        assert!(!policy.fork_allowed("other/x", None));
    }
}
