// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Workspace Aggregate
//!
//! A workspace is a time-bounded handle to one remotely executed, isolated
//! working directory. It owns its [`WorkspaceBackend`].
//!
//! ## Invariants
//!
//! - A workspace is usable only while `now - created_at <= ttl`.
//! - Expiry is detected lazily by the registry on the next lookup; nothing
//!   sweeps workspaces in the background.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::backend::WorkspaceBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceId(pub Uuid);

impl WorkspaceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkspaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkspaceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Execution mode of a workspace. Only `Code` is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceMode {
    Code,
    /// Recognised but not implemented.
    Desktop,
}

impl WorkspaceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Desktop => "desktop",
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Code)
    }
}

impl fmt::Display for WorkspaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkspaceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "code" => Ok(Self::Code),
            "desktop" => Ok(Self::Desktop),
            other => Err(format!("Unsupported workspace mode: {other}")),
        }
    }
}

pub struct Workspace {
    pub id: WorkspaceId,
    pub mode: WorkspaceMode,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
    backend: Arc<dyn WorkspaceBackend>,
}

impl Workspace {
    pub fn new(
        id: WorkspaceId,
        mode: WorkspaceMode,
        ttl: Duration,
        backend: Arc<dyn WorkspaceBackend>,
    ) -> Self {
        Self {
            id,
            mode,
            created_at: Utc::now(),
            ttl,
            backend,
        }
    }

    pub fn backend(&self) -> &Arc<dyn WorkspaceBackend> {
        &self.backend
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + self.ttl
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > self.ttl
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn info(&self) -> WorkspaceInfo {
        WorkspaceInfo {
            workspace_id: self.id,
            mode: self.mode,
            created_at: self.created_at,
            expires_at: self.expires_at(),
            ttl_minutes: self.ttl.num_minutes(),
        }
    }
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("created_at", &self.created_at)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Serializable summary returned by workspace creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub workspace_id: WorkspaceId,
    pub mode: WorkspaceMode,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ttl_minutes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("code".parse::<WorkspaceMode>().unwrap(), WorkspaceMode::Code);
        assert_eq!(" Desktop ".parse::<WorkspaceMode>().unwrap(), WorkspaceMode::Desktop);
        assert!("vm".parse::<WorkspaceMode>().is_err());
        assert!(WorkspaceMode::Code.is_supported());
        assert!(!WorkspaceMode::Desktop.is_supported());
    }

    #[test]
    fn test_workspace_id_roundtrip() {
        let id = WorkspaceId::new();
        let parsed: WorkspaceId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<WorkspaceId>().is_err());
    }
}
