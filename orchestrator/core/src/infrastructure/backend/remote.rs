// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Remote Sandbox Backend
//!
//! Drives a remote sandbox service over its REST API.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Provision sandboxes and execute argument vectors remotely
//! - **Integration:** Workspace registry → HTTP API → Sandbox VM
//!
//! # Endpoints
//!
//! | Method | Path | Use |
//! |--------|------|-----|
//! | `POST` | `/sandboxes` | create |
//! | `POST` | `/sandboxes/{id}/commands` | run an argument vector |
//! | `GET`/`PUT` | `/sandboxes/{id}/files?path=` | read/write a text file |
//! | `DELETE` | `/sandboxes/{id}` | tear down |
//!
//! Every request carries the API key in `X-API-Key`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::domain::backend::{
    BackendError, BackendProvisioner, CommandOutput, ProvisionSpec, WorkspaceBackend,
};
use crate::domain::config::GatewayConfigManifest;

const API_KEY_HEADER: &str = "X-API-Key";
const ASKPASS_SCRIPT_NAME: &str = "git-askpass.sh";
const ASKPASS_SCRIPT: &str = "#!/bin/sh\n\
case \"$1\" in\n  \
*Username*) echo \"x-access-token\" ;;\n  \
*) echo \"$GITHUB_TOKEN\" ;;\n\
esac\n";

/// Extra time allowed for the HTTP round trip on top of the command budget.
const TRANSPORT_GRACE: Duration = Duration::from_secs(15);
const FILE_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const GIT_IDENTITY_NAME: &str = "prgate";
const GIT_IDENTITY_EMAIL: &str = "prgate@localhost";

#[derive(Debug, Clone)]
pub struct RemoteSandboxSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub template: Option<String>,
    pub home_dir: String,
    pub github_token: Option<String>,
}

impl RemoteSandboxSettings {
    pub fn from_config(config: &GatewayConfigManifest) -> Self {
        let sandbox = &config.spec.sandbox;
        Self {
            api_url: sandbox.api_url.trim_end_matches('/').to_string(),
            api_key: config.sandbox_api_key(),
            template: sandbox.template.clone(),
            home_dir: sandbox.home_dir.trim_end_matches('/').to_string(),
            github_token: config.github_token(),
        }
    }

    /// Map a workspace-relative path onto the sandbox filesystem.
    fn absolute(&self, path: &str) -> String {
        match path {
            "" | "." => self.home_dir.clone(),
            p if p.starts_with('/') => p.to_string(),
            p => format!("{}/{}", self.home_dir, p),
        }
    }

    fn command_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        if let Some(token) = &self.github_token {
            env.insert("GITHUB_TOKEN".to_string(), token.clone());
        }
        env.insert(
            "GIT_ASKPASS".to_string(),
            format!("{}/{}", self.home_dir, ASKPASS_SCRIPT_NAME),
        );
        env.insert("GIT_TERMINAL_PROMPT".to_string(), "0".to_string());
        for key in ["GIT_AUTHOR_NAME", "GIT_COMMITTER_NAME"] {
            env.insert(key.to_string(), GIT_IDENTITY_NAME.to_string());
        }
        for key in ["GIT_AUTHOR_EMAIL", "GIT_COMMITTER_EMAIL"] {
            env.insert(key.to_string(), GIT_IDENTITY_EMAIL.to_string());
        }
        env
    }
}

#[derive(Debug, Serialize)]
struct CreateSandboxRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    template: Option<&'a str>,
    timeout_seconds: u64,
    mode: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateSandboxResponse {
    sandbox_id: String,
}

#[derive(Debug, Serialize)]
struct RunCommandRequest<'a> {
    argv: &'a [String],
    cwd: String,
    env: HashMap<String, String>,
    timeout_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct RunCommandResponse {
    exit_code: i32,
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
    #[serde(default)]
    timed_out: bool,
}

/// One provisioned remote sandbox.
pub struct RemoteSandboxBackend {
    client: Client,
    settings: Arc<RemoteSandboxSettings>,
    api_key: String,
    sandbox_id: String,
}

impl RemoteSandboxBackend {
    pub fn sandbox_id(&self) -> &str {
        &self.sandbox_id
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/sandboxes/{}{}", self.settings.api_url, self.sandbox_id, suffix)
    }

    async fn execute(
        &self,
        argv: &[String],
        cwd: &str,
        timeout: Duration,
    ) -> Result<RunCommandResponse, reqwest::Error> {
        let body = RunCommandRequest {
            argv,
            cwd: self.settings.absolute(cwd),
            env: self.settings.command_env(),
            timeout_seconds: timeout.as_secs().max(1),
        };
        self.client
            .post(self.url("/commands"))
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(timeout + TRANSPORT_GRACE)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<RunCommandResponse>()
            .await
    }

    /// Install the git credential helper. Failures are logged and ignored.
    async fn install_askpass(&self) {
        if let Err(e) = self.write_text(ASKPASS_SCRIPT_NAME, ASKPASS_SCRIPT).await {
            warn!(sandbox_id = %self.sandbox_id, error = %e, "Failed to write askpass script");
            return;
        }
        let chmod = ["chmod", "+x", ASKPASS_SCRIPT_NAME].map(String::from);
        match self.run(&chmod, ".", Duration::from_secs(10)).await {
            Ok(out) if out.exit_code == 0 => {
                debug!(sandbox_id = %self.sandbox_id, "Askpass script installed");
            }
            Ok(out) => {
                warn!(sandbox_id = %self.sandbox_id, exit_code = out.exit_code, "chmod of askpass script failed");
            }
            Err(e) => {
                warn!(sandbox_id = %self.sandbox_id, error = %e, "chmod of askpass script failed");
            }
        }
    }
}

#[async_trait]
impl WorkspaceBackend for RemoteSandboxBackend {
    async fn run(
        &self,
        argv: &[String],
        cwd: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError> {
        let started = Instant::now();
        let response = self.execute(argv, cwd, timeout).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match response {
            Ok(resp) if resp.timed_out => Ok(CommandOutput::timed_out(duration_ms)),
            Ok(resp) => Ok(CommandOutput {
                exit_code: resp.exit_code,
                stdout: resp.stdout,
                stderr: resp.stderr,
                duration_ms,
                timed_out: false,
            }),
            Err(e) if e.is_timeout() => {
                warn!(sandbox_id = %self.sandbox_id, "Remote command timed out");
                Ok(CommandOutput::timed_out(duration_ms))
            }
            Err(e) => {
                warn!(sandbox_id = %self.sandbox_id, error = %e, "Remote command failed in transport");
                Err(BackendError::Transport(e.to_string()))
            }
        }
    }

    async fn read_text(&self, path: &str) -> Result<String, BackendError> {
        let full_path = self.settings.absolute(path);
        let response = self
            .client
            .get(self.url("/files"))
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[("path", full_path.as_str())])
            .timeout(FILE_REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(BackendError::NotFound(path.to_string())),
            status if !status.is_success() => Err(BackendError::Io(format!(
                "Could not read file '{path}' (HTTP {status})"
            ))),
            _ => response
                .text()
                .await
                .map_err(|e| BackendError::Transport(e.to_string())),
        }
    }

    async fn write_text(&self, path: &str, content: &str) -> Result<(), BackendError> {
        let full_path = self.settings.absolute(path);
        let response = self
            .client
            .put(self.url("/files"))
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[("path", full_path.as_str())])
            .timeout(FILE_REQUEST_TIMEOUT)
            .body(content.to_string())
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BackendError::Io(format!(
                "Could not write file '{path}' (HTTP {})",
                response.status()
            )));
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<(), BackendError> {
        let response = self
            .client
            .delete(self.url(""))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        match response.status() {
            status if status.is_success() || status == StatusCode::NOT_FOUND => {
                info!(sandbox_id = %self.sandbox_id, "Sandbox destroyed");
                Ok(())
            }
            status => Err(BackendError::Io(format!(
                "Sandbox teardown failed (HTTP {status})"
            ))),
        }
    }
}

/// Creates [`RemoteSandboxBackend`]s.
pub struct RemoteSandboxProvisioner {
    client: Client,
    settings: Arc<RemoteSandboxSettings>,
}

impl RemoteSandboxProvisioner {
    pub fn new(settings: RemoteSandboxSettings) -> Self {
        Self {
            client: Client::new(),
            settings: Arc::new(settings),
        }
    }

    pub fn from_config(config: &GatewayConfigManifest) -> Self {
        Self::new(RemoteSandboxSettings::from_config(config))
    }
}

#[async_trait]
impl BackendProvisioner for RemoteSandboxProvisioner {
    async fn provision(
        &self,
        spec: &ProvisionSpec,
    ) -> Result<Arc<dyn WorkspaceBackend>, BackendError> {
        let api_key = self.settings.api_key.clone().ok_or_else(|| {
            BackendError::Provisioning("sandbox API key is not configured".to_string())
        })?;

        let body = CreateSandboxRequest {
            template: self.settings.template.as_deref(),
            timeout_seconds: spec.ttl.as_secs(),
            mode: spec.mode.as_str(),
        };
        let response = self
            .client
            .post(format!("{}/sandboxes", self.settings.api_url))
            .header(API_KEY_HEADER, &api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Provisioning(format!("sandbox API unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Provisioning(format!(
                "sandbox creation failed (HTTP {status})"
            )));
        }
        let created: CreateSandboxResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Provisioning(format!("invalid sandbox response: {e}")))?;

        info!(sandbox_id = %created.sandbox_id, mode = %spec.mode, "Sandbox provisioned");

        let backend = RemoteSandboxBackend {
            client: self.client.clone(),
            settings: self.settings.clone(),
            api_key,
            sandbox_id: created.sandbox_id,
        };
        backend.install_askpass().await;
        Ok(Arc::new(backend))
    }
}
