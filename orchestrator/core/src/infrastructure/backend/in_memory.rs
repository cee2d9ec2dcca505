// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory workspace backend for tests and offline runs.
//!
//! Files live in a map. Commands never execute: each invocation is recorded
//! and answered from scripted responses matched by argument-vector prefix,
//! falling back to a successful empty output.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::backend::{
    BackendError, BackendProvisioner, CommandOutput, ProvisionSpec, WorkspaceBackend,
};

/// One recorded `run` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub argv: Vec<String>,
    pub cwd: String,
    pub timeout: Duration,
}

#[derive(Default)]
pub struct InMemoryBackend {
    files: Mutex<HashMap<String, String>>,
    responses: Mutex<Vec<(Vec<String>, CommandOutput)>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Mutex<Option<Duration>>,
    destroyed: AtomicBool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer any argv starting with `prefix` with `output`. Later scripts
    /// take precedence over earlier ones.
    pub fn script<I, S>(&self, prefix: I, output: CommandOutput)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefix = prefix.into_iter().map(Into::into).collect();
        self.responses.lock().push((prefix, output));
    }

    /// Make every `run` take at least `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn put_file(&self, path: impl Into<String>, content: impl Into<String>) {
        self.files.lock().insert(path.into(), content.into());
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.files.lock().get(path).cloned()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn response_for(&self, argv: &[String]) -> CommandOutput {
        self.responses
            .lock()
            .iter()
            .rev()
            .find(|(prefix, _)| argv.starts_with(prefix))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::success(""))
    }
}

#[async_trait]
impl WorkspaceBackend for InMemoryBackend {
    async fn run(
        &self,
        argv: &[String],
        cwd: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError> {
        if self.is_destroyed() {
            return Err(BackendError::Transport("backend destroyed".to_string()));
        }
        self.calls.lock().push(RecordedCall {
            argv: argv.to_vec(),
            cwd: cwd.to_string(),
            timeout,
        });

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.response_for(argv))
    }

    async fn read_text(&self, path: &str) -> Result<String, BackendError> {
        self.file(path)
            .ok_or_else(|| BackendError::NotFound(path.to_string()))
    }

    async fn write_text(&self, path: &str, content: &str) -> Result<(), BackendError> {
        if self.is_destroyed() {
            return Err(BackendError::Io("backend destroyed".to_string()));
        }
        self.put_file(path, content);
        Ok(())
    }

    async fn destroy(&self) -> Result<(), BackendError> {
        self.destroyed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Hands out [`InMemoryBackend`]s, either fresh or a shared pre-scripted one.
#[derive(Default)]
pub struct InMemoryProvisioner {
    shared: Option<Arc<InMemoryBackend>>,
    fail_with: Mutex<Option<String>>,
    provisioned: AtomicUsize,
}

impl InMemoryProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every provisioned workspace gets `backend`.
    pub fn with_backend(backend: Arc<InMemoryBackend>) -> Self {
        Self {
            shared: Some(backend),
            ..Self::default()
        }
    }

    /// Fail subsequent provisioning with `reason`.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.fail_with.lock() = Some(reason.into());
    }

    pub fn provisioned(&self) -> usize {
        self.provisioned.load(Ordering::Acquire)
    }
}

#[async_trait]
impl BackendProvisioner for InMemoryProvisioner {
    async fn provision(
        &self,
        _spec: &ProvisionSpec,
    ) -> Result<Arc<dyn WorkspaceBackend>, BackendError> {
        if let Some(reason) = self.fail_with.lock().clone() {
            return Err(BackendError::Provisioning(reason));
        }
        self.provisioned.fetch_add(1, Ordering::AcqRel);
        Ok(match &self.shared {
            Some(backend) => backend.clone(),
            None => Arc::new(InMemoryBackend::new()),
        })
    }
}
