// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use prgate_core::domain::backend::CommandOutput;
use prgate_core::domain::config::{GatewayConfigManifest, SecretString};
use prgate_core::infrastructure::backend::{InMemoryBackend, InMemoryProvisioner};
use prgate_core::{Gateway, GatewayError};
use std::sync::Arc;
use std::time::Duration;

const TOKEN: &str = "ghp_integrationtoken0000";

fn config() -> GatewayConfigManifest {
    let mut config = GatewayConfigManifest::default();
    config.spec.github.username = "bot".to_string();
    config.spec.github.token = Some(SecretString::new(TOKEN));
    config
}

fn gateway_with(backend: Arc<InMemoryBackend>) -> Gateway {
    Gateway::new(config(), Arc::new(InMemoryProvisioner::with_backend(backend))).unwrap()
}

#[tokio::test]
async fn test_workspace_lifecycle() {
    let backend = Arc::new(InMemoryBackend::new());
    let gateway = gateway_with(backend.clone());

    let info = gateway.create_workspace("code", Some(10_000)).await.unwrap();
    assert_eq!(info.ttl_minutes, 360);
    assert_eq!(gateway.registry().len(), 1);

    let id = info.workspace_id.to_string();
    assert!(gateway.destroy_workspace(&id).await);
    assert!(backend.is_destroyed());
    assert!(!gateway.destroy_workspace(&id).await);
    assert!(!gateway.destroy_workspace("not-a-uuid").await);
}

#[tokio::test]
async fn test_desktop_mode_is_unsupported() {
    let gateway = gateway_with(Arc::new(InMemoryBackend::new()));
    let err = gateway.create_workspace("desktop", None).await.unwrap_err();
    assert!(matches!(err, GatewayError::Unsupported(_)));

    let err = gateway.create_workspace("vm", None).await.unwrap_err();
    assert!(matches!(err, GatewayError::Unsupported(_)));
    assert!(gateway.registry().is_empty());
}

#[tokio::test]
async fn test_provisioning_failure_is_redacted() {
    let provisioner = InMemoryProvisioner::new();
    provisioner.fail_with(format!("bad credentials {TOKEN}"));
    let gateway = Gateway::new(config(), Arc::new(provisioner)).unwrap();

    let err = gateway.create_workspace("code", None).await.unwrap_err();
    match err {
        GatewayError::Infrastructure(message) => {
            assert!(!message.contains(TOKEN));
            assert!(message.contains("<REDACTED>"));
        }
        other => panic!("expected infrastructure error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_workspace_is_not_found() {
    let gateway = gateway_with(Arc::new(InMemoryBackend::new()));
    let err = gateway
        .run_command("00000000-0000-0000-0000-000000000000", "git status", None, None, "safe")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
}

#[tokio::test]
async fn test_command_policy_applies_before_dispatch() {
    let backend = Arc::new(InMemoryBackend::new());
    let gateway = gateway_with(backend.clone());
    let id = gateway.create_workspace("code", None).await.unwrap().workspace_id.to_string();

    for command in [
        "curl https://example.com",
        "git status; rm -rf /",
        "pip install --index-url https://mirror.invalid/simple requests",
        "git push origin main",
        "pre-commit run",
        "ls -la",
    ] {
        let err = gateway
            .run_command(&id, command, None, None, "safe")
            .await
            .unwrap_err();
        assert!(
            matches!(err, GatewayError::PolicyViolation(_)),
            "{command} should be rejected"
        );
    }

    let err = gateway
        .run_command(&id, "pytest", Some("../etc"), None, "safe")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::PolicyViolation(_)));

    let err = gateway
        .run_command(&id, "pytest", None, None, "root")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::PolicyViolation(_)));

    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_allowed_command_runs_confined_and_redacted() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.script(
        ["pytest"],
        CommandOutput::success(format!("token={TOKEN}\n1 passed")),
    );
    let gateway = gateway_with(backend.clone());
    let id = gateway.create_workspace("code", None).await.unwrap().workspace_id.to_string();

    let result = gateway
        .run_command(&id, "pytest -q", Some("repo/src"), Some(30), "safe")
        .await
        .unwrap();
    assert!(result.succeeded());
    assert!(!result.stdout.contains(TOKEN));
    assert!(result.stdout.contains("1 passed"));

    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].argv, vec!["pytest", "-q"]);
    assert_eq!(calls[0].cwd, "repo/src");
    assert_eq!(calls[0].timeout, Duration::from_secs(30));

    let expert = gateway
        .run_command(&id, "pre-commit run --all-files", None, None, "expert")
        .await
        .unwrap();
    assert!(expert.succeeded());
}

#[tokio::test]
async fn test_nonzero_exit_is_a_result() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.script(["ruff"], CommandOutput::failure(1, "E501 line too long"));
    let gateway = gateway_with(backend);
    let id = gateway.create_workspace("code", None).await.unwrap().workspace_id.to_string();

    let result = gateway
        .run_command(&id, "ruff check .", None, None, "safe")
        .await
        .unwrap();
    assert_eq!(result.exit_code, 1);
    assert!(!result.succeeded());
    assert!(result.stderr.contains("E501"));
}

#[tokio::test]
async fn test_concurrent_run_is_busy() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.set_delay(Duration::from_millis(200));
    let gateway = gateway_with(backend.clone());
    let first = gateway.create_workspace("code", None).await.unwrap().workspace_id.to_string();
    let second = gateway.create_workspace("code", None).await.unwrap().workspace_id.to_string();

    let (slow, rejected) = tokio::join!(
        gateway.run_command(&first, "pytest", None, None, "safe"),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            gateway.run_command(&second, "git status", None, None, "safe").await
        }
    );

    assert!(slow.is_ok());
    let err = rejected.unwrap_err();
    assert!(matches!(err, GatewayError::Busy));
    assert!(err.is_transient());
    assert!(!gateway.registry().is_running());

    assert!(gateway
        .run_command(&second, "git status", None, None, "safe")
        .await
        .is_ok());
    assert_eq!(backend.calls().len(), 2);
}

#[tokio::test]
async fn test_file_tools_are_confined_and_redacted() {
    let backend = Arc::new(InMemoryBackend::new());
    let gateway = gateway_with(backend.clone());
    let id = gateway.create_workspace("code", None).await.unwrap().workspace_id.to_string();

    assert!(gateway
        .write_file(&id, "src/app.py", &format!("KEY = '{TOKEN}'\n"))
        .await
        .unwrap());
    assert!(backend.file("repo/src/app.py").is_some());

    let content = gateway.read_file(&id, "src/app.py").await.unwrap();
    assert_eq!(content, "KEY = '<REDACTED>'\n");

    for path in ["/etc/passwd", "../secrets", "src/../../x"] {
        let err = gateway.read_file(&id, path).await.unwrap_err();
        assert!(matches!(err, GatewayError::PolicyViolation(_)), "{path}");
    }

    let err = gateway.read_file(&id, "missing.txt").await.unwrap_err();
    assert!(matches!(err, GatewayError::Backend(_)));
}

#[tokio::test]
async fn test_shutdown_destroys_everything() {
    let gateway = Gateway::new(config(), Arc::new(InMemoryProvisioner::new())).unwrap();
    tokio_test::assert_ok!(gateway.create_workspace("code", None).await);
    tokio_test::assert_ok!(gateway.create_workspace("code", Some(5)).await);

    assert_eq!(gateway.shutdown().await, 2);
    assert!(gateway.registry().is_empty());
}

#[test]
fn test_gateway_rejects_inverted_ttl_bounds() {
    let mut config = config();
    config.spec.workspace.ttl_minutes_min = 120;
    config.spec.workspace.ttl_minutes_max = 0;
    assert!(Gateway::new(config, Arc::new(InMemoryProvisioner::new())).is_err());
}

#[tokio::test]
async fn test_file_backend_errors_are_redacted() {
    let gateway = gateway_with(Arc::new(InMemoryBackend::new()));
    let id = gateway.create_workspace("code", None).await.unwrap().workspace_id.to_string();

    let err = gateway
        .read_file(&id, &format!("notes/{TOKEN}.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Backend(_)));
    assert!(!err.to_string().contains(TOKEN));
}
