// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Gateway Configuration Types
//
// Defines the configuration schema for a prgate gateway process:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Patch and command limits
// - Workspace and approval lifetimes
// - Repository allowlist and GitHub identity
// - Remote sandbox endpoint and credentials

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub const API_VERSION: &str = "prgate/v1";
pub const KIND: &str = "GatewayConfig";

/// Environment variable naming an explicit configuration file.
pub const CONFIG_PATH_ENV: &str = "PRGATE_CONFIG_PATH";

const MASK: &str = "********";

/// A credential value, either literal or an `env:VAR_NAME` reference.
///
/// Literal values never appear in `Debug` output and serialise as a mask.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn env_reference(&self) -> Option<&str> {
        self.0.strip_prefix("env:")
    }

    /// The effective secret value. `env:` references are read from the
    /// process environment; an unset or empty variable yields `None`.
    pub fn resolve(&self) -> Option<String> {
        match self.env_reference() {
            Some(var) => std::env::var(var).ok().filter(|v| !v.is_empty()),
            None if self.0.is_empty() => None,
            None => Some(self.0.clone()),
        }
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.env_reference() {
            Some(var) => write!(f, "SecretString(env:{var})"),
            None => write!(f, "SecretString({MASK})"),
        }
    }
}

impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.env_reference().is_some() {
            serializer.serialize_str(&self.0)
        } else {
            serializer.serialize_str(MASK)
        }
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

/// Top-level Kubernetes-style gateway configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfigManifest {
    /// API version (must be "prgate/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "GatewayConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: GatewayConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfigSpec {
    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub github: GithubConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_changed_files")]
    pub max_changed_files: usize,

    #[serde(default = "default_max_patch_lines")]
    pub max_patch_lines: usize,

    /// Ceiling for a single command's wall-clock budget
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,

    /// One command at a time across all workspaces. Must stay `true`.
    #[serde(default = "default_true")]
    pub single_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes_default: u32,

    #[serde(default = "default_ttl_min")]
    pub ttl_minutes_min: u32,

    #[serde(default = "default_ttl_max")]
    pub ttl_minutes_max: u32,

    /// Lifetime of an unconsumed approval
    #[serde(default = "default_approval_ttl")]
    pub approval_ttl_minutes: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default)]
    pub username: String,

    /// Allowed upstreams (`owner/repo`, `owner/*`, `*`). Empty means `<username>/*`.
    #[serde(default)]
    pub allowed_repos: Vec<String>,

    /// Token (supports "env:VAR_NAME")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<SecretString>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_sandbox_url")]
    pub api_url: String,

    /// API key (supports "env:VAR_NAME")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<SecretString>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    #[serde(default = "default_home_dir")]
    pub home_dir: String,
}

fn default_true() -> bool {
    true
}

fn default_max_changed_files() -> usize {
    50
}

fn default_max_patch_lines() -> usize {
    5000
}

fn default_command_timeout() -> u64 {
    300
}

fn default_ttl_minutes() -> u32 {
    60
}

fn default_ttl_min() -> u32 {
    1
}

fn default_ttl_max() -> u32 {
    360
}

fn default_approval_ttl() -> u32 {
    1440
}

fn default_sandbox_url() -> String {
    "http://localhost:49982".to_string()
}

fn default_home_dir() -> String {
    "/home/user".to_string()
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_changed_files: default_max_changed_files(),
            max_patch_lines: default_max_patch_lines(),
            command_timeout_seconds: default_command_timeout(),
            single_run: true,
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            ttl_minutes_default: default_ttl_minutes(),
            ttl_minutes_min: default_ttl_min(),
            ttl_minutes_max: default_ttl_max(),
            approval_ttl_minutes: default_approval_ttl(),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            api_url: default_sandbox_url(),
            api_key: None,
            template: None,
            home_dir: default_home_dir(),
        }
    }
}

impl Default for GatewayConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "prgate".to_string(),
                labels: None,
            },
            spec: GatewayConfigSpec::default(),
        }
    }
}

impl GatewayConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Serialise with literal secrets masked
    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover configuration file using precedence order
    /// 1. PRGATE_CONFIG_PATH environment variable
    /// 2. ./prgate-config.yaml (working directory)
    /// 3. ~/.prgate/config.yaml (user home)
    /// 4. /etc/prgate/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./prgate-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".prgate").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/prgate/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            Self::from_yaml_file(&config_path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", config_path, e)
            })?
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("GITHUB_TOKEN") {
            tracing::info!("Environment override: GITHUB_TOKEN");
            self.spec.github.token = Some(SecretString::new(token));
        }
        if let Some(username) = get("GITHUB_USERNAME") {
            tracing::info!("Environment override: GITHUB_USERNAME={}", username);
            self.spec.github.username = username;
        }
        if let Some(repos) = get("ALLOWED_REPOS") {
            tracing::info!("Environment override: ALLOWED_REPOS={}", repos);
            self.spec.github.allowed_repos = repos
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(key) = get("SANDBOX_API_KEY").or_else(|| get("E2B_API_KEY")) {
            tracing::info!("Environment override: SANDBOX_API_KEY");
            self.spec.sandbox.api_key = Some(SecretString::new(key));
        }
        if let Some(url) = get("SANDBOX_API_URL") {
            tracing::info!("Environment override: SANDBOX_API_URL={}", url);
            self.spec.sandbox.api_url = url;
        }

        override_number(&get, "COMMAND_TIMEOUT_S", &mut self.spec.limits.command_timeout_seconds);
        override_number(&get, "RUN_TTL_MINUTES", &mut self.spec.workspace.ttl_minutes_default);
        override_number(&get, "RUN_TTL_MAX_MINUTES", &mut self.spec.workspace.ttl_minutes_max);
        override_number(&get, "MAX_CHANGED_FILES", &mut self.spec.limits.max_changed_files);
        override_number(&get, "MAX_PATCH_LINES", &mut self.spec.limits.max_patch_lines);
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let limits = &self.spec.limits;
        if !limits.single_run {
            anyhow::bail!("spec.limits.single_run must be true");
        }
        if limits.max_changed_files == 0 {
            anyhow::bail!("spec.limits.max_changed_files must be greater than zero");
        }
        if limits.max_patch_lines == 0 {
            anyhow::bail!("spec.limits.max_patch_lines must be greater than zero");
        }
        if limits.command_timeout_seconds == 0 {
            anyhow::bail!("spec.limits.command_timeout_seconds must be greater than zero");
        }

        let ws = &self.spec.workspace;
        if ws.ttl_minutes_min == 0 {
            anyhow::bail!("spec.workspace.ttl_minutes_min must be at least 1");
        }
        if ws.ttl_minutes_min > ws.ttl_minutes_max {
            anyhow::bail!(
                "spec.workspace.ttl_minutes_min ({}) exceeds ttl_minutes_max ({})",
                ws.ttl_minutes_min,
                ws.ttl_minutes_max
            );
        }
        if ws.ttl_minutes_default < ws.ttl_minutes_min || ws.ttl_minutes_default > ws.ttl_minutes_max {
            anyhow::bail!(
                "spec.workspace.ttl_minutes_default ({}) must be within [{}, {}]",
                ws.ttl_minutes_default,
                ws.ttl_minutes_min,
                ws.ttl_minutes_max
            );
        }
        if ws.approval_ttl_minutes == 0 {
            anyhow::bail!("spec.workspace.approval_ttl_minutes must be greater than zero");
        }

        if self.spec.sandbox.api_url.is_empty() {
            anyhow::bail!("spec.sandbox.api_url cannot be empty");
        }

        Ok(())
    }

    /// Allowlist with the `<username>/*` default applied.
    pub fn allowed_repos(&self) -> Vec<String> {
        let github = &self.spec.github;
        if github.allowed_repos.is_empty() && !github.username.is_empty() {
            vec![format!("{}/*", github.username)]
        } else {
            github.allowed_repos.clone()
        }
    }

    pub fn github_token(&self) -> Option<String> {
        self.spec.github.token.as_ref().and_then(SecretString::resolve)
    }

    pub fn sandbox_api_key(&self) -> Option<String> {
        self.spec.sandbox.api_key.as_ref().and_then(SecretString::resolve)
    }

    /// Resolved secrets to scrub from every outbound text.
    pub fn secret_literals(&self) -> Vec<String> {
        [self.github_token(), self.sandbox_api_key()]
            .into_iter()
            .flatten()
            .collect()
    }
}

fn override_number<T, G>(get: &G, key: &str, target: &mut T)
where
    T: std::str::FromStr + fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => {
                tracing::info!("Environment override: {}={}", key, value);
                *target = value;
            }
            Err(_) => {
                tracing::warn!("Invalid value for {}: '{}'. Expected a number. Ignoring.", key, raw);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = GatewayConfigManifest::default();
        assert_eq!(manifest.api_version, "prgate/v1");
        assert_eq!(manifest.kind, "GatewayConfig");
        assert_eq!(manifest.spec.limits.max_changed_files, 50);
        assert_eq!(manifest.spec.limits.max_patch_lines, 5000);
        assert_eq!(manifest.spec.limits.command_timeout_seconds, 300);
        assert_eq!(manifest.spec.workspace.ttl_minutes_max, 360);
        assert_eq!(manifest.spec.sandbox.home_dir, "/home/user");
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_parsing_with_partial_spec() {
        let yaml = r#"
apiVersion: prgate/v1
kind: GatewayConfig
metadata:
  name: ci-gateway
spec:
  limits:
    max_patch_lines: 800
  github:
    username: bot
    token: "env:PRGATE_TEST_UNSET_TOKEN"
"#;
        let manifest = GatewayConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.metadata.name, "ci-gateway");
        assert_eq!(manifest.spec.limits.max_patch_lines, 800);
        assert_eq!(manifest.spec.limits.max_changed_files, 50);
        assert_eq!(manifest.spec.workspace.ttl_minutes_default, 60);
        assert_eq!(manifest.allowed_repos(), vec!["bot/*".to_string()]);
        assert_eq!(manifest.github_token(), None);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut manifest = GatewayConfigManifest::default();
        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());

        let mut manifest = GatewayConfigManifest::default();
        manifest.spec.limits.single_run = false;
        assert!(manifest.validate().is_err());

        let mut manifest = GatewayConfigManifest::default();
        manifest.spec.workspace.ttl_minutes_min = 0;
        assert!(manifest.validate().is_err());

        let mut manifest = GatewayConfigManifest::default();
        manifest.spec.workspace.ttl_minutes_default = 500;
        assert!(manifest.validate().is_err());

        let mut manifest = GatewayConfigManifest::default();
        manifest.spec.workspace.ttl_minutes_min = 400;
        assert!(manifest.validate().is_err());

        let mut manifest = GatewayConfigManifest::default();
        manifest.spec.limits.command_timeout_seconds = 0;
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("GITHUB_TOKEN", "ghp_literal"),
            ("GITHUB_USERNAME", "bot"),
            ("ALLOWED_REPOS", "acme/widgets, tools/* ,"),
            ("E2B_API_KEY", "sandbox-key"),
            ("COMMAND_TIMEOUT_S", "120"),
            ("MAX_PATCH_LINES", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut manifest = GatewayConfigManifest::default();
        manifest.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(manifest.spec.github.username, "bot");
        assert_eq!(manifest.allowed_repos(), vec!["acme/widgets", "tools/*"]);
        assert_eq!(manifest.github_token().as_deref(), Some("ghp_literal"));
        assert_eq!(manifest.sandbox_api_key().as_deref(), Some("sandbox-key"));
        assert_eq!(manifest.spec.limits.command_timeout_seconds, 120);
        assert_eq!(manifest.spec.limits.max_patch_lines, 5000);
        assert_eq!(manifest.secret_literals().len(), 2);
    }

    #[test]
    fn test_secret_string_is_masked() {
        let secret = SecretString::new("hunter2");
        assert!(!format!("{secret:?}").contains("hunter2"));

        let mut manifest = GatewayConfigManifest::default();
        manifest.spec.github.token = Some(secret);
        manifest.spec.sandbox.api_key = Some(SecretString::new("env:SANDBOX_KEY"));
        let yaml = manifest.to_yaml_string().unwrap();
        assert!(!yaml.contains("hunter2"));
        assert!(yaml.contains("env:SANDBOX_KEY"));
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.yaml");
        std::fs::write(
            &path,
            "apiVersion: prgate/v1\nkind: GatewayConfig\nmetadata:\n  name: from-file\n",
        )
        .unwrap();

        let manifest = GatewayConfigManifest::load_or_default(Some(path)).unwrap();
        assert_eq!(manifest.metadata.name, "from-file");

        let missing = dir.path().join("missing.yaml");
        assert!(GatewayConfigManifest::load_or_default(Some(missing)).is_err());
    }
}
