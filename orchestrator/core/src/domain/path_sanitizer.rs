// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Path Confinement Domain Service
//!
//! Confines every working directory and file path handed to a workspace
//! backend to a single repository subtree. This is a domain service (not
//! infrastructure) because the subtree lives inside a remote backend the
//! gateway cannot see: all checks are lexical and never touch a filesystem.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Lexical normalisation and traversal rejection for sandbox paths

use thiserror::Error;

/// Directory name every workspace path is confined to.
pub const DEFAULT_CONFINEMENT_ROOT: &str = "repo";

/// Path confinement errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfinementError {
    #[error("path '{0}' must be relative and within the repository")]
    Absolute(String),

    #[error("path '{path}' must be within {root}/")]
    OutsideRoot { path: String, root: String },

    #[error("path '{path}' escapes {root}/")]
    Traversal { path: String, root: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path too long: {0}")]
    PathTooLong(String),
}

/// Path confinement domain service
///
/// # Security Guarantees
/// - Rejects absolute (`/...`) and home-relative (`~...`) paths
/// - Collapses `.` and `..` segments lexically
/// - Rejects anything that resolves outside the confinement root
/// - Rejects null bytes and oversized paths
#[derive(Debug, Clone)]
pub struct PathConfinement {
    root: String,
    /// Maximum allowed path length (default: 4096)
    max_path_len: usize,
}

impl PathConfinement {
    /// Confinement to the default `repo` root
    pub fn new() -> Self {
        Self::with_root(DEFAULT_CONFINEMENT_ROOT)
    }

    pub fn with_root(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            max_path_len: 4096,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Normalise a working directory onto the confinement root.
    ///
    /// # Examples
    /// ```
    /// use prgate_core::domain::path_sanitizer::PathConfinement;
    ///
    /// let confinement = PathConfinement::new();
    /// assert_eq!(confinement.normalize(None).unwrap(), "repo");
    /// assert_eq!(confinement.normalize(Some("repo/./src")).unwrap(), "repo/src");
    /// assert!(confinement.normalize(Some("repo/../../etc")).is_err());
    /// ```
    pub fn normalize(&self, path: Option<&str>) -> Result<String, ConfinementError> {
        let raw = match path {
            None | Some("") => return Ok(self.root.clone()),
            Some(raw) => raw,
        };

        self.check_raw(raw)?;

        let mut norm = lexical_normalize(raw);
        if norm == "." {
            norm = self.root.clone();
        }

        let prefix = format!("{}/", self.root);
        if norm != self.root && !norm.starts_with(&prefix) {
            tracing::warn!(path = %raw, root = %self.root, "Path outside confinement root");
            return Err(ConfinementError::OutsideRoot {
                path: raw.to_string(),
                root: self.root.clone(),
            });
        }

        if has_parent_segment(&norm) {
            tracing::warn!(path = %raw, "Path traversal attempt detected");
            return Err(ConfinementError::Traversal {
                path: raw.to_string(),
                root: self.root.clone(),
            });
        }

        Ok(norm)
    }

    /// Resolve a repository-relative file path (`src/lib.rs`) to its
    /// workspace path (`repo/src/lib.rs`).
    pub fn resolve_file(&self, path: &str) -> Result<String, ConfinementError> {
        self.check_raw(path)?;

        let norm = lexical_normalize(path);
        if has_parent_segment(&norm) {
            tracing::warn!(path = %path, "File path escapes repository");
            return Err(ConfinementError::Traversal {
                path: path.to_string(),
                root: self.root.clone(),
            });
        }

        if norm == "." {
            return Ok(self.root.clone());
        }
        Ok(format!("{}/{}", self.root, norm))
    }

    fn check_raw(&self, raw: &str) -> Result<(), ConfinementError> {
        if raw.len() > self.max_path_len {
            return Err(ConfinementError::PathTooLong(raw.to_string()));
        }
        if raw.contains('\0') {
            return Err(ConfinementError::InvalidPath(
                "Path contains null byte".to_string(),
            ));
        }
        if raw.starts_with('/') || raw.starts_with('~') {
            tracing::warn!(path = %raw, "Absolute path rejected");
            return Err(ConfinementError::Absolute(raw.to_string()));
        }
        Ok(())
    }
}

impl Default for PathConfinement {
    fn default() -> Self {
        Self::new()
    }
}

/// Collapse `.`, `..` and repeated separators without consulting a filesystem.
/// Leading `..` segments of a relative path are kept.
pub fn lexical_normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(last) if *last != "..") {
                    parts.pop();
                } else {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

fn has_parent_segment(path: &str) -> bool {
    path.split('/').any(|segment| segment == "..")
}
