// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Secret Redaction
//!
//! Scrubs credential material from every piece of text that leaves the
//! gateway: command stdout/stderr, file reads, diffs and serialised approval
//! metadata. Known secret literals are replaced first, then a fixed set of
//! credential-shaped patterns, so literals too short to match any pattern
//! are still caught.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Last transformation applied before a caller sees sandbox output

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Replacement text for every redacted secret.
pub const REDACTED: &str = "<REDACTED>";

static TOKEN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // PEM private key blocks, matched first so a block collapses to one placeholder
        r"(?is)-----BEGIN [A-Z ]+ PRIVATE KEY-----.+?-----END [A-Z ]+ PRIVATE KEY-----",
        // GitHub tokens
        r"(?i)gh[pousr]_[A-Za-z0-9]{30,}",
        r"(?i)github_pat_[A-Za-z0-9_]{20,}",
        // OpenAI-style API keys
        r"(?i)sk-[A-Za-z0-9]{20,}",
        // AWS access key ids
        r"(?i)A(?:KIA|SIA)[A-Z0-9]{16}",
        // AWS secret keys (40 base64-like chars)
        r"[A-Za-z0-9/+=]{40}",
        // Bearer tokens
        r"(?i)Bearer\s+[A-Za-z0-9\-._~+/]+=*",
        // Generic long tokens
        r"[A-Za-z0-9_-]{32,}",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("valid regex"))
    .collect()
});

/// Redact `text` using the given secret literals and the built-in patterns.
///
/// Absent text is treated as empty.
pub fn redact_secrets<S: AsRef<str>>(text: Option<&str>, secrets: &[S]) -> String {
    let mut redacted = text.unwrap_or_default().to_string();

    for secret in secrets {
        let secret = secret.as_ref();
        if !secret.is_empty() {
            redacted = redacted.replace(secret, REDACTED);
        }
    }

    for pattern in TOKEN_PATTERNS.iter() {
        if pattern.is_match(&redacted) {
            redacted = pattern.replace_all(&redacted, REDACTED).into_owned();
        }
    }

    redacted
}

/// Redactor bound to the process's known secret literals.
#[derive(Clone, Default)]
pub struct SecretRedactor {
    secrets: Vec<String>,
}

impl SecretRedactor {
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            secrets: secrets
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
        }
    }

    pub fn redact(&self, text: &str) -> String {
        redact_secrets(Some(text), &self.secrets)
    }

    /// Redact every string nested anywhere inside a JSON value.
    pub fn redact_json(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.redact(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact_json(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.redact_json(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl std::fmt::Debug for SecretRedactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretRedactor")
            .field("secrets", &self.secrets.len())
            .finish()
    }
}
