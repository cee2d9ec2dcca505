// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Gateway Errors
//!
//! One variant per failure class a caller must be able to tell apart.
//! Command-level failure (non-zero exit, timeout) is not an error here: it
//! is reported as a successful [`CommandResult`](crate::application::workspace_registry::CommandResult).
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Error taxonomy shared by every gateway operation

use thiserror::Error;

use crate::domain::backend::BackendError;
use crate::domain::path_sanitizer::ConfinementError;
use crate::domain::workspace::WorkspaceId;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Unknown workspace: {0}")]
    NotFound(String),

    #[error("Workspace '{id}' has expired. Create a new workspace with workspace_create.")]
    Expired { id: WorkspaceId },

    #[error("Not supported: {0}")]
    Unsupported(String),

    #[error("Infrastructure failure: {0}")]
    Infrastructure(String),

    #[error("Another command is currently running; only one run is allowed at a time")]
    Busy,

    #[error("Approval denied: {0}")]
    ApprovalDenied(String),

    #[error("Patch limit exceeded: {0}")]
    PatchLimit(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl GatewayError {
    /// `Busy` is the only condition worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Busy)
    }
}

impl From<ConfinementError> for GatewayError {
    fn from(err: ConfinementError) -> Self {
        Self::PolicyViolation(err.to_string())
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
