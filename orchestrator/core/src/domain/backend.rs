// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::domain::redaction::SecretRedactor;
use crate::domain::workspace::WorkspaceMode;

/// Exit code reported when a command exceeded its wall-clock budget.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 0,
            timed_out: false,
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 0,
            timed_out: false,
        }
    }

    pub fn timed_out(duration_ms: u64) -> Self {
        Self {
            exit_code: TIMEOUT_EXIT_CODE,
            stdout: String::new(),
            stderr: "Command timed out".to_string(),
            duration_ms,
            timed_out: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Failed to provision workspace backend: {0}")]
    Provisioning(String),
    #[error("Backend transport error: {0}")]
    Transport(String),
    #[error("Backend I/O error: {0}")]
    Io(String),
    #[error("Not found in backend: {0}")]
    NotFound(String),
}

impl BackendError {
    /// The same error with secrets scrubbed from its message.
    pub fn redacted(self, redactor: &SecretRedactor) -> Self {
        match self {
            Self::Provisioning(m) => Self::Provisioning(redactor.redact(&m)),
            Self::Transport(m) => Self::Transport(redactor.redact(&m)),
            Self::Io(m) => Self::Io(redactor.redact(&m)),
            Self::NotFound(m) => Self::NotFound(redactor.redact(&m)),
        }
    }
}

/// What the registry asks a provisioner for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionSpec {
    pub mode: WorkspaceMode,
    pub ttl: Duration,
}

/// Remote execution capability driven by the workspace registry.
///
/// Only already-validated argument vectors reach `run`; implementations must
/// execute them without a shell. A command that fails or times out is a
/// successful call returning a [`CommandOutput`] describing the failure.
#[async_trait]
pub trait WorkspaceBackend: Send + Sync {
    async fn run(&self, argv: &[String], cwd: &str, timeout: Duration)
        -> Result<CommandOutput, BackendError>;
    async fn read_text(&self, path: &str) -> Result<String, BackendError>;
    async fn write_text(&self, path: &str, content: &str) -> Result<(), BackendError>;
    async fn destroy(&self) -> Result<(), BackendError>;
}

/// Fallible factory for workspace backends.
#[async_trait]
pub trait BackendProvisioner: Send + Sync {
    async fn provision(&self, spec: &ProvisionSpec)
        -> Result<Arc<dyn WorkspaceBackend>, BackendError>;
}
