// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! File tools and patch application inside a workspace repository.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::workspace_registry::WorkspaceRegistry;
use crate::domain::backend::BackendError;
use crate::domain::errors::{GatewayError, GatewayResult};
use crate::domain::patch::{enforce_patch_limits, PatchStats};
use crate::domain::workspace::WorkspaceId;

/// Scratch location for patches, relative to the repository root.
pub const PATCH_SCRATCH_PATH: &str = ".prgate/tmp.patch";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchLimits {
    pub max_changed_files: usize,
    pub max_patch_lines: usize,
}

impl Default for PatchLimits {
    fn default() -> Self {
        Self {
            max_changed_files: 50,
            max_patch_lines: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyPatchResult {
    pub applied: bool,
    pub files_modified: Vec<String>,
    pub diff_lines: usize,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub stderr: String,
}

pub struct EditService {
    registry: Arc<WorkspaceRegistry>,
    limits: PatchLimits,
}

impl EditService {
    pub fn new(registry: Arc<WorkspaceRegistry>, limits: PatchLimits) -> Self {
        Self { registry, limits }
    }

    pub fn limits(&self) -> &PatchLimits {
        &self.limits
    }

    fn backend_error(&self, e: BackendError) -> GatewayError {
        GatewayError::Backend(e.redacted(self.registry.redactor()))
    }

    /// Read a repository-relative file. Content is redacted.
    pub async fn read_file(&self, ws: &WorkspaceId, path: &str) -> GatewayResult<String> {
        let full_path = self.registry.confinement().resolve_file(path)?;
        let workspace = self.registry.get(ws).await?;
        let content = workspace
            .backend()
            .read_text(&full_path)
            .await
            .map_err(|e| self.backend_error(e))?;
        Ok(self.registry.redactor().redact(&content))
    }

    /// Write a repository-relative file.
    pub async fn write_file(
        &self,
        ws: &WorkspaceId,
        path: &str,
        content: &str,
    ) -> GatewayResult<bool> {
        let full_path = self.registry.confinement().resolve_file(path)?;
        let workspace = self.registry.get(ws).await?;
        workspace
            .backend()
            .write_text(&full_path, content)
            .await
            .map_err(|e| self.backend_error(e))?;
        info!(workspace_id = %ws, path = %full_path, bytes = content.len(), "File written");
        Ok(true)
    }

    /// Apply a unified diff after checking it against the patch limits.
    pub async fn apply_patch(
        &self,
        ws: &WorkspaceId,
        unified_diff: &str,
    ) -> GatewayResult<ApplyPatchResult> {
        let stats = PatchStats::from_unified_diff(unified_diff);
        if let Err(e) = enforce_patch_limits(
            &stats,
            self.limits.max_changed_files,
            self.limits.max_patch_lines,
        ) {
            warn!(workspace_id = %ws, error = %e, "Patch rejected");
            return Err(e);
        }

        let scratch = self.registry.confinement().resolve_file(PATCH_SCRATCH_PATH)?;
        let workspace = self.registry.get(ws).await?;
        workspace
            .backend()
            .write_text(&scratch, unified_diff)
            .await
            .map_err(|e| self.backend_error(e))?;

        let result = self.registry.run_git_apply(ws, PATCH_SCRATCH_PATH).await?;
        if !result.succeeded() {
            warn!(workspace_id = %ws, exit_code = result.exit_code, "git apply failed");
            return Ok(ApplyPatchResult {
                applied: false,
                files_modified: Vec::new(),
                diff_lines: 0,
                stderr: result.stderr,
            });
        }

        info!(
            workspace_id = %ws,
            files = stats.files.len(),
            lines = stats.changed_lines(),
            "Patch applied"
        );
        Ok(ApplyPatchResult {
            applied: true,
            diff_lines: stats.changed_lines(),
            files_modified: stats.files,
            stderr: String::new(),
        })
    }
}
