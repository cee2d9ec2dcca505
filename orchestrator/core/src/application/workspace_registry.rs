// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Workspace Registry
//!
//! Owns every live workspace and the single process-wide run slot. All
//! command execution reaches a backend through this service, which applies
//! command policy and path confinement first and redaction last.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Workspace lifecycle, lazy TTL eviction, serialised command dispatch
//!
//! # Concurrency
//!
//! The workspace map is a [`DashMap`]; no shard lock is held across a backend
//! round trip. At most one command runs at a time across all workspaces. A
//! second caller gets [`GatewayError::Busy`] immediately instead of queueing.
//! File reads and writes and workspace create/destroy do not take the run slot.

use chrono::Duration as TtlDuration;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::backend::{BackendProvisioner, CommandOutput, ProvisionSpec};
use crate::domain::command_policy::{
    apply_argv, push_argv, CommandValidator, TrustMode, ValidatedCommand,
};
use crate::domain::config::GatewayConfigManifest;
use crate::domain::errors::{GatewayError, GatewayResult};
use crate::domain::path_sanitizer::PathConfinement;
use crate::domain::redaction::SecretRedactor;
use crate::domain::workspace::{Workspace, WorkspaceId, WorkspaceInfo, WorkspaceMode};

/// Lifetime and timeout bounds applied by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    pub ttl_minutes_default: u32,
    pub ttl_minutes_min: u32,
    pub ttl_minutes_max: u32,
    /// Ceiling and default for a single command
    pub command_timeout: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            ttl_minutes_default: 60,
            ttl_minutes_min: 1,
            ttl_minutes_max: 360,
            command_timeout: Duration::from_secs(300),
        }
    }
}

impl From<&GatewayConfigManifest> for RegistrySettings {
    fn from(config: &GatewayConfigManifest) -> Self {
        let ws = &config.spec.workspace;
        Self {
            ttl_minutes_default: ws.ttl_minutes_default,
            ttl_minutes_min: ws.ttl_minutes_min,
            ttl_minutes_max: ws.ttl_minutes_max,
            command_timeout: Duration::from_secs(config.spec.limits.command_timeout_seconds),
        }
    }
}

/// Redacted outcome of one command. Non-zero exits and timeouts are results,
/// not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub run_id: Uuid,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
}

impl CommandResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Held while a command is in flight; releases the slot on drop.
struct RunSlot<'a>(&'a AtomicBool);

impl<'a> RunSlot<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct WorkspaceRegistry {
    provisioner: Arc<dyn BackendProvisioner>,
    workspaces: DashMap<WorkspaceId, Arc<Workspace>>,
    run_active: AtomicBool,
    validator: CommandValidator,
    redactor: SecretRedactor,
    settings: RegistrySettings,
}

impl WorkspaceRegistry {
    pub fn new(
        provisioner: Arc<dyn BackendProvisioner>,
        validator: CommandValidator,
        redactor: SecretRedactor,
        settings: RegistrySettings,
    ) -> Self {
        Self {
            provisioner,
            workspaces: DashMap::new(),
            run_active: AtomicBool::new(false),
            validator,
            redactor,
            settings,
        }
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    pub fn confinement(&self) -> &PathConfinement {
        self.validator.confinement()
    }

    pub fn redactor(&self) -> &SecretRedactor {
        &self.redactor
    }

    pub fn len(&self) -> usize {
        self.workspaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workspaces.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.run_active.load(Ordering::Acquire)
    }

    /// Requested TTL clamped into `[min, max]`; `None` takes the default.
    /// Inverted bounds resolve to `max`.
    pub fn clamp_ttl(&self, ttl_minutes: Option<u32>) -> u32 {
        let requested = ttl_minutes.unwrap_or(self.settings.ttl_minutes_default);
        requested
            .max(self.settings.ttl_minutes_min)
            .min(self.settings.ttl_minutes_max)
    }

    fn clamp_timeout(&self, timeout_seconds: Option<u64>) -> Duration {
        let ceiling = self.settings.command_timeout;
        match timeout_seconds {
            Some(secs) => Duration::from_secs(secs.max(1)).min(ceiling),
            None => ceiling,
        }
    }

    pub async fn create(
        &self,
        mode: WorkspaceMode,
        ttl_minutes: Option<u32>,
    ) -> GatewayResult<WorkspaceInfo> {
        if !mode.is_supported() {
            warn!(mode = %mode, "Unsupported workspace mode requested");
            return Err(GatewayError::Unsupported(format!(
                "Workspace mode '{mode}' is not supported"
            )));
        }

        let ttl = self.clamp_ttl(ttl_minutes);
        let spec = ProvisionSpec {
            mode,
            ttl: Duration::from_secs(u64::from(ttl) * 60),
        };

        let backend = self.provisioner.provision(&spec).await.map_err(|e| {
            warn!(mode = %mode, error = %e, "Workspace provisioning failed");
            GatewayError::Infrastructure(self.redactor.redact(&e.to_string()))
        })?;

        let workspace = Workspace::new(
            WorkspaceId::new(),
            mode,
            TtlDuration::minutes(i64::from(ttl)),
            backend,
        );
        let info = workspace.info();
        self.workspaces.insert(workspace.id, Arc::new(workspace));

        info!(
            workspace_id = %info.workspace_id,
            mode = %mode,
            ttl_minutes = ttl,
            "Workspace created"
        );
        Ok(info)
    }

    /// Resolve a live workspace. An expired workspace is removed and torn down
    /// by this call and reported as [`GatewayError::Expired`].
    pub async fn get(&self, id: &WorkspaceId) -> GatewayResult<Arc<Workspace>> {
        if let Some((_, expired)) = self.workspaces.remove_if(id, |_, ws| ws.is_expired()) {
            info!(workspace_id = %id, "Workspace expired; destroying");
            teardown(&expired).await;
            return Err(GatewayError::Expired { id: *id });
        }

        self.workspaces
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))
    }

    /// Remove and tear down a workspace. Returns whether one was registered.
    pub async fn destroy(&self, id: &WorkspaceId) -> bool {
        match self.workspaces.remove(id) {
            Some((_, workspace)) => {
                teardown(&workspace).await;
                info!(workspace_id = %id, "Workspace destroyed");
                true
            }
            None => false,
        }
    }

    /// Tear down every registered workspace.
    pub async fn destroy_all(&self) -> usize {
        let ids: Vec<WorkspaceId> = self.workspaces.iter().map(|e| *e.key()).collect();
        let mut destroyed = 0;
        for id in ids {
            if self.destroy(&id).await {
                destroyed += 1;
            }
        }
        destroyed
    }

    /// Run a caller-supplied command line.
    pub async fn run_command(
        &self,
        id: &WorkspaceId,
        command: &str,
        cwd: Option<&str>,
        timeout_seconds: Option<u64>,
        mode: TrustMode,
    ) -> GatewayResult<CommandResult> {
        let workspace = self.get(id).await?;
        let validated = self.validator.validate(command, cwd, mode)?;
        self.dispatch(&workspace, validated, self.clamp_timeout(timeout_seconds))
            .await
    }

    /// Run an argument vector built by a repository operation.
    pub async fn run_internal_git(
        &self,
        id: &WorkspaceId,
        argv: &[String],
        cwd: Option<&str>,
    ) -> GatewayResult<CommandResult> {
        let workspace = self.get(id).await?;
        let validated = self.validator.validate_internal_git(argv, cwd)?;
        self.dispatch(&workspace, validated, self.settings.command_timeout)
            .await
    }

    /// Push `HEAD` to `origin`.
    ///
    /// `authorize` runs once the run slot is held and before the push is
    /// dispatched. A `Busy` rejection never reaches it, so an approval it
    /// consumes is only spent on a push that actually runs.
    pub async fn run_git_push<F>(
        &self,
        id: &WorkspaceId,
        branch: Option<&str>,
        authorize: F,
    ) -> GatewayResult<CommandResult>
    where
        F: FnOnce() -> GatewayResult<()>,
    {
        let workspace = self.get(id).await?;
        let validated = ValidatedCommand {
            argv: push_argv(branch),
            cwd: self.confinement().root().to_string(),
        };
        let _slot = self.acquire_slot(&workspace)?;
        authorize()?;
        self.execute(&workspace, validated, self.settings.command_timeout)
            .await
    }

    /// Apply a patch file given relative to the repository root.
    pub async fn run_git_apply(
        &self,
        id: &WorkspaceId,
        patch_path: &str,
    ) -> GatewayResult<CommandResult> {
        let workspace = self.get(id).await?;
        let validated = ValidatedCommand {
            argv: apply_argv(patch_path),
            cwd: self.confinement().root().to_string(),
        };
        self.dispatch(&workspace, validated, self.settings.command_timeout)
            .await
    }

    async fn dispatch(
        &self,
        workspace: &Workspace,
        command: ValidatedCommand,
        timeout: Duration,
    ) -> GatewayResult<CommandResult> {
        let _slot = self.acquire_slot(workspace)?;
        self.execute(workspace, command, timeout).await
    }

    fn acquire_slot(&self, workspace: &Workspace) -> GatewayResult<RunSlot<'_>> {
        RunSlot::try_acquire(&self.run_active).ok_or_else(|| {
            warn!(workspace_id = %workspace.id, "Command rejected: another run is active");
            GatewayError::Busy
        })
    }

    /// Run on the backend. The caller holds the run slot.
    async fn execute(
        &self,
        workspace: &Workspace,
        command: ValidatedCommand,
        timeout: Duration,
    ) -> GatewayResult<CommandResult> {
        debug!(
            workspace_id = %workspace.id,
            argv = ?command.argv,
            cwd = %command.cwd,
            timeout_secs = timeout.as_secs(),
            "Dispatching command"
        );

        let output = workspace
            .backend()
            .run(&command.argv, &command.cwd, timeout)
            .await
            .map_err(|e| {
                warn!(workspace_id = %workspace.id, error = %e, "Backend could not execute command");
                GatewayError::Infrastructure(self.redactor.redact(&e.to_string()))
            })?;

        Ok(self.redact_output(output))
    }

    fn redact_output(&self, output: CommandOutput) -> CommandResult {
        CommandResult {
            run_id: Uuid::new_v4(),
            exit_code: output.exit_code,
            stdout: self.redactor.redact(&output.stdout),
            stderr: self.redactor.redact(&output.stderr),
            duration_ms: output.duration_ms,
            timed_out: output.timed_out,
        }
    }
}

async fn teardown(workspace: &Workspace) {
    if let Err(e) = workspace.backend().destroy().await {
        warn!(workspace_id = %workspace.id, error = %e, "Backend teardown failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::backend::in_memory::{InMemoryBackend, InMemoryProvisioner};
    use chrono::Utc;

    fn registry_with(provisioner: InMemoryProvisioner) -> WorkspaceRegistry {
        WorkspaceRegistry::new(
            Arc::new(provisioner),
            CommandValidator::default(),
            SecretRedactor::new(["tok-literal"]),
            RegistrySettings::default(),
        )
    }

    fn insert_backdated(
        registry: &WorkspaceRegistry,
        backend: Arc<InMemoryBackend>,
        ttl_minutes: i64,
        age_minutes: i64,
    ) -> WorkspaceId {
        let mut ws = Workspace::new(
            WorkspaceId::new(),
            WorkspaceMode::Code,
            TtlDuration::minutes(ttl_minutes),
            backend,
        );
        ws.created_at = Utc::now() - TtlDuration::minutes(age_minutes);
        let id = ws.id;
        registry.workspaces.insert(id, Arc::new(ws));
        id
    }

    #[tokio::test]
    async fn test_expired_workspace_is_evicted_on_get() {
        let registry = registry_with(InMemoryProvisioner::new());
        let backend = Arc::new(InMemoryBackend::new());
        let id = insert_backdated(&registry, backend.clone(), 1, 5);

        let err = registry.get(&id).await.unwrap_err();
        assert!(matches!(err, GatewayError::Expired { id: expired } if expired == id));
        assert!(backend.is_destroyed());
        assert!(registry.is_empty());

        let err = registry.get(&id).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_workspace_within_ttl_is_usable() {
        let registry = registry_with(InMemoryProvisioner::new());
        let backend = Arc::new(InMemoryBackend::new());
        let id = insert_backdated(&registry, backend.clone(), 60, 59);

        assert!(registry.get(&id).await.is_ok());
        assert!(!backend.is_destroyed());
    }

    #[tokio::test]
    async fn test_expired_workspace_rejects_commands() {
        let registry = registry_with(InMemoryProvisioner::new());
        let backend = Arc::new(InMemoryBackend::new());
        let id = insert_backdated(&registry, backend.clone(), 1, 2);

        let err = registry
            .run_command(&id, "git status", None, None, TrustMode::Safe)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Expired { .. }));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_clamp_ttl() {
        let registry = registry_with(InMemoryProvisioner::new());
        assert_eq!(registry.clamp_ttl(Some(0)), 1);
        assert_eq!(registry.clamp_ttl(Some(10_000)), 360);
        assert_eq!(registry.clamp_ttl(Some(30)), 30);
        assert_eq!(registry.clamp_ttl(None), 60);
    }

    #[test]
    fn test_clamp_ttl_with_inverted_bounds_does_not_panic() {
        let registry = WorkspaceRegistry::new(
            Arc::new(InMemoryProvisioner::new()),
            CommandValidator::default(),
            SecretRedactor::default(),
            RegistrySettings {
                ttl_minutes_default: 30,
                ttl_minutes_min: 120,
                ttl_minutes_max: 60,
                command_timeout: Duration::from_secs(10),
            },
        );
        assert_eq!(registry.clamp_ttl(None), 60);
        assert_eq!(registry.clamp_ttl(Some(1)), 60);
        assert_eq!(registry.clamp_ttl(Some(500)), 60);
    }

    #[tokio::test]
    async fn test_push_authorization_is_skipped_when_busy() {
        let registry = registry_with(InMemoryProvisioner::new());
        let backend = Arc::new(InMemoryBackend::new());
        let id = insert_backdated(&registry, backend.clone(), 60, 0);

        let held = RunSlot::try_acquire(&registry.run_active).unwrap();
        let mut authorized = false;
        let err = registry
            .run_git_push(&id, None, || {
                authorized = true;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Busy));
        assert!(!authorized);
        drop(held);

        let err = registry
            .run_git_push(&id, None, || Err(GatewayError::ApprovalDenied("spent".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ApprovalDenied(_)));
        assert!(backend.calls().is_empty());
        assert!(!registry.is_running());

        let result = registry.run_git_push(&id, Some("fix"), || Ok(())).await.unwrap();
        assert!(result.succeeded());
        assert_eq!(backend.calls()[0].argv, vec!["git", "push", "origin", "HEAD:fix"]);
    }

    #[test]
    fn test_clamp_timeout() {
        let registry = registry_with(InMemoryProvisioner::new());
        assert_eq!(registry.clamp_timeout(None), Duration::from_secs(300));
        assert_eq!(registry.clamp_timeout(Some(9_999)), Duration::from_secs(300));
        assert_eq!(registry.clamp_timeout(Some(0)), Duration::from_secs(1));
        assert_eq!(registry.clamp_timeout(Some(20)), Duration::from_secs(20));
    }

    #[test]
    fn test_run_slot_releases_on_drop() {
        let flag = AtomicBool::new(false);
        {
            let _slot = RunSlot::try_acquire(&flag).unwrap();
            assert!(RunSlot::try_acquire(&flag).is_none());
        }
        assert!(RunSlot::try_acquire(&flag).is_some());
    }
}
