// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Unified diff statistics and size limits.

use serde::{Deserialize, Serialize};

use crate::domain::errors::GatewayError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchStats {
    /// Touched files in first-seen order.
    pub files: Vec<String>,
    pub insertions: usize,
    pub deletions: usize,
}

impl PatchStats {
    /// Scan a unified diff without applying it.
    pub fn from_unified_diff(diff: &str) -> Self {
        let mut stats = PatchStats::default();
        for line in diff.lines() {
            if let Some(path) = line
                .strip_prefix("+++ ")
                .or_else(|| line.strip_prefix("--- "))
            {
                let path = path.split('\t').next().unwrap_or_default().trim();
                if path == "/dev/null" {
                    continue;
                }
                let path = path
                    .strip_prefix("a/")
                    .or_else(|| path.strip_prefix("b/"))
                    .unwrap_or(path);
                if !path.is_empty() && !stats.files.iter().any(|f| f == path) {
                    stats.files.push(path.to_string());
                }
            } else if line.starts_with('+') {
                stats.insertions += 1;
            } else if line.starts_with('-') {
                stats.deletions += 1;
            }
        }
        stats
    }

    pub fn changed_lines(&self) -> usize {
        self.insertions + self.deletions
    }
}

/// Reject a patch touching more than `max_files` files or changing more than
/// `max_lines` lines.
pub fn enforce_patch_limits(
    stats: &PatchStats,
    max_files: usize,
    max_lines: usize,
) -> Result<(), GatewayError> {
    if stats.files.len() > max_files {
        return Err(GatewayError::PatchLimit(format!(
            "Patch modifies {} files which exceeds the limit of {max_files}",
            stats.files.len()
        )));
    }
    if stats.changed_lines() > max_lines {
        return Err(GatewayError::PatchLimit(format!(
            "Patch has {} lines which exceeds the limit of {max_lines}",
            stats.changed_lines()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIFF: &str = "\
diff --git a/src/lib.rs b/src/lib.rs
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,3 +1,3 @@
 fn main() {
-    old();
+    new();
 }
diff --git a/NEW.md b/NEW.md
--- /dev/null
+++ b/NEW.md
@@ -0,0 +1,2 @@
+hello
+world
";

    #[test]
    fn test_stats() {
        let stats = PatchStats::from_unified_diff(DIFF);
        assert_eq!(stats.files, vec!["src/lib.rs".to_string(), "NEW.md".to_string()]);
        assert_eq!(stats.insertions, 3);
        assert_eq!(stats.deletions, 1);
        assert_eq!(stats.changed_lines(), 4);
    }

    #[test]
    fn test_limits() {
        let stats = PatchStats::from_unified_diff(DIFF);
        assert!(enforce_patch_limits(&stats, 2, 4).is_ok());
        assert!(matches!(
            enforce_patch_limits(&stats, 1, 100),
            Err(GatewayError::PatchLimit(_))
        ));
        assert!(matches!(
            enforce_patch_limits(&stats, 10, 3),
            Err(GatewayError::PatchLimit(_))
        ));
    }

    #[test]
    fn test_empty_diff() {
        let stats = PatchStats::from_unified_diff("");
        assert!(stats.files.is_empty());
        assert_eq!(stats.changed_lines(), 0);
    }
}
