// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Gateway
//!
//! The context object a host process builds once at start-up. It owns the
//! registry, ledger, redactor and repository policy, and exposes the tool
//! surface with string identifiers as they arrive from a caller.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Composition root and tool surface; holds no global state

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::approval_ledger::ApprovalLedger;
use crate::application::edit_service::{ApplyPatchResult, EditService, PatchLimits};
use crate::application::pull_request::{PullRequestClient, PullRequestDraft, PullRequestInfo};
use crate::application::repo_service::{
    CloneResult, CommitResult, DiffSummary, PrTemplate, PushResult, RepoService,
};
use crate::application::workspace_registry::{CommandResult, RegistrySettings, WorkspaceRegistry};
use crate::domain::approval::{ApprovalDecision, ApprovalPayload, GatedAction};
use crate::domain::backend::BackendProvisioner;
use crate::domain::command_policy::{CommandValidator, TrustMode};
use crate::domain::config::GatewayConfigManifest;
use crate::domain::errors::{GatewayError, GatewayResult};
use crate::domain::path_sanitizer::PathConfinement;
use crate::domain::redaction::SecretRedactor;
use crate::domain::repo_policy::RepoPolicy;
use crate::domain::workspace::{WorkspaceId, WorkspaceInfo, WorkspaceMode};

pub struct Gateway {
    config: GatewayConfigManifest,
    registry: Arc<WorkspaceRegistry>,
    ledger: Arc<ApprovalLedger>,
    repos: RepoService,
    edits: EditService,
    redactor: SecretRedactor,
    pull_requests: Option<Arc<dyn PullRequestClient>>,
}

impl Gateway {
    /// Build the gateway. Fails if `config` does not validate.
    pub fn new(
        config: GatewayConfigManifest,
        provisioner: Arc<dyn BackendProvisioner>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let redactor = SecretRedactor::new(config.secret_literals());
        let registry = Arc::new(WorkspaceRegistry::new(
            provisioner,
            CommandValidator::new(PathConfinement::new()),
            redactor.clone(),
            RegistrySettings::from(&config),
        ));
        let ledger = Arc::new(ApprovalLedger::new(chrono::Duration::minutes(i64::from(
            config.spec.workspace.approval_ttl_minutes,
        ))));
        let policy = RepoPolicy::new(config.spec.github.username.clone(), config.allowed_repos());
        let repos = RepoService::new(registry.clone(), ledger.clone(), policy);
        let edits = EditService::new(
            registry.clone(),
            PatchLimits {
                max_changed_files: config.spec.limits.max_changed_files,
                max_patch_lines: config.spec.limits.max_patch_lines,
            },
        );

        Ok(Self {
            config,
            registry,
            ledger,
            repos,
            edits,
            redactor,
            pull_requests: None,
        })
    }

    pub fn with_pull_request_client(mut self, client: Arc<dyn PullRequestClient>) -> Self {
        self.pull_requests = Some(client);
        self
    }

    pub fn config(&self) -> &GatewayConfigManifest {
        &self.config
    }

    pub fn registry(&self) -> &Arc<WorkspaceRegistry> {
        &self.registry
    }

    pub fn ledger(&self) -> &Arc<ApprovalLedger> {
        &self.ledger
    }

    pub fn repos(&self) -> &RepoService {
        &self.repos
    }

    pub fn edits(&self) -> &EditService {
        &self.edits
    }

    pub fn redactor(&self) -> &SecretRedactor {
        &self.redactor
    }

    // -- workspaces --------------------------------------------------------

    pub async fn create_workspace(
        &self,
        mode: &str,
        ttl_minutes: Option<u32>,
    ) -> GatewayResult<WorkspaceInfo> {
        let mode: WorkspaceMode = mode.parse().map_err(GatewayError::Unsupported)?;
        self.registry.create(mode, ttl_minutes).await
    }

    pub async fn destroy_workspace(&self, workspace_id: &str) -> bool {
        match workspace_id.parse::<WorkspaceId>() {
            Ok(id) => self.registry.destroy(&id).await,
            Err(_) => false,
        }
    }

    pub async fn run_command(
        &self,
        workspace_id: &str,
        command: &str,
        cwd: Option<&str>,
        timeout_seconds: Option<u64>,
        mode: &str,
    ) -> GatewayResult<CommandResult> {
        let id = parse_workspace_id(workspace_id)?;
        let mode: TrustMode = mode.parse()?;
        self.registry
            .run_command(&id, command, cwd, timeout_seconds, mode)
            .await
    }

    // -- files -------------------------------------------------------------

    pub async fn read_file(&self, workspace_id: &str, path: &str) -> GatewayResult<String> {
        self.edits.read_file(&parse_workspace_id(workspace_id)?, path).await
    }

    pub async fn write_file(
        &self,
        workspace_id: &str,
        path: &str,
        content: &str,
    ) -> GatewayResult<bool> {
        self.edits
            .write_file(&parse_workspace_id(workspace_id)?, path, content)
            .await
    }

    pub async fn apply_patch(
        &self,
        workspace_id: &str,
        unified_diff: &str,
    ) -> GatewayResult<ApplyPatchResult> {
        self.edits
            .apply_patch(&parse_workspace_id(workspace_id)?, unified_diff)
            .await
    }

    // -- approvals ---------------------------------------------------------

    pub fn request_approval(&self, payload: ApprovalPayload, approved: bool) -> ApprovalDecision {
        self.ledger.request(payload, approved)
    }

    pub fn consume_approval(&self, token: &str, action: &str) -> bool {
        self.ledger.consume(token, action)
    }

    /// Redacted snapshot of a live approval record.
    pub fn peek_approval(&self, token: &str) -> Option<Value> {
        let record = self.ledger.peek(token)?;
        match serde_json::to_value(&record) {
            Ok(value) => Some(self.redactor.redact_json(&value)),
            Err(e) => {
                warn!(error = %e, "Failed to serialise approval record");
                None
            }
        }
    }

    // -- repository --------------------------------------------------------

    pub async fn clone_repo(&self, workspace_id: &str, url: &str) -> GatewayResult<CloneResult> {
        self.repos.clone_repo(&parse_workspace_id(workspace_id)?, url).await
    }

    pub async fn setup_remotes(
        &self,
        workspace_id: &str,
        fork_url: &str,
        upstream_url: &str,
        base_branch: &str,
    ) -> GatewayResult<CloneResult> {
        self.repos
            .setup_remotes(&parse_workspace_id(workspace_id)?, fork_url, upstream_url, base_branch)
            .await
    }

    pub async fn list_branches(&self, workspace_id: &str, all: bool) -> GatewayResult<Vec<String>> {
        self.repos.list_branches(&parse_workspace_id(workspace_id)?, all).await
    }

    pub async fn find_existing_branches(
        &self,
        workspace_id: &str,
        patterns: &[String],
    ) -> GatewayResult<Vec<String>> {
        self.repos
            .find_existing_branches(&parse_workspace_id(workspace_id)?, patterns)
            .await
    }

    pub async fn add_remote(&self, workspace_id: &str, name: &str, url: &str) -> GatewayResult<bool> {
        self.repos.add_remote(&parse_workspace_id(workspace_id)?, name, url).await
    }

    pub async fn fetch(&self, workspace_id: &str, remote: &str) -> GatewayResult<bool> {
        self.repos.fetch(&parse_workspace_id(workspace_id)?, remote).await
    }

    pub async fn checkout(&self, workspace_id: &str, reference: &str) -> GatewayResult<bool> {
        self.repos.checkout(&parse_workspace_id(workspace_id)?, reference).await
    }

    pub async fn create_branch(
        &self,
        workspace_id: &str,
        name: &str,
        from_ref: &str,
    ) -> GatewayResult<bool> {
        self.repos
            .create_branch(&parse_workspace_id(workspace_id)?, name, from_ref)
            .await
    }

    pub async fn diff(&self, workspace_id: &str) -> GatewayResult<DiffSummary> {
        self.repos.diff(&parse_workspace_id(workspace_id)?).await
    }

    pub async fn commit(&self, workspace_id: &str, message: &str) -> GatewayResult<CommitResult> {
        self.repos.commit(&parse_workspace_id(workspace_id)?, message).await
    }

    pub async fn read_pr_template(&self, workspace_id: &str) -> GatewayResult<PrTemplate> {
        self.repos.read_pr_template(&parse_workspace_id(workspace_id)?).await
    }

    pub async fn push(
        &self,
        workspace_id: &str,
        remote: &str,
        branch: Option<&str>,
        approval_id: Option<&str>,
    ) -> GatewayResult<PushResult> {
        self.repos
            .push(&parse_workspace_id(workspace_id)?, remote, branch, approval_id)
            .await
    }

    /// Open a pull request, consuming the approval's `open_pr` action.
    pub async fn open_pull_request(
        &self,
        approval_id: Option<&str>,
        draft: &PullRequestDraft,
    ) -> GatewayResult<PullRequestInfo> {
        draft.validate(self.repos.policy())?;

        let Some(client) = self.pull_requests.as_ref() else {
            return Err(GatewayError::Unsupported(
                "No pull request client is configured".to_string(),
            ));
        };

        let approved =
            approval_id.is_some_and(|id| self.ledger.consume(id, GatedAction::OpenPr.as_str()));
        if !approved {
            return Err(GatewayError::ApprovalDenied(
                "A valid approval_id is required to open a pull request".to_string(),
            ));
        }

        let pr = client.open_pull_request(draft).await.map_err(|e| {
            GatewayError::Infrastructure(self.redactor.redact(&format!(
                "Failed to open pull request: {e}"
            )))
        })?;
        info!(
            upstream = %draft.upstream_repo,
            head = %draft.head_ref(),
            number = pr.number,
            "Pull request opened"
        );
        Ok(pr)
    }

    /// Tear down every workspace. Called on host shutdown.
    pub async fn shutdown(&self) -> usize {
        let destroyed = self.registry.destroy_all().await;
        info!(destroyed, "Gateway shut down");
        destroyed
    }
}

fn parse_workspace_id(raw: &str) -> GatewayResult<WorkspaceId> {
    raw.parse()
        .map_err(|_| GatewayError::NotFound(raw.to_string()))
}
