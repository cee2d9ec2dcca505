// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workspace backend implementations, selected when the gateway is built.

pub mod in_memory;
pub mod remote;

pub use in_memory::{InMemoryBackend, InMemoryProvisioner};
pub use remote::{RemoteSandboxBackend, RemoteSandboxProvisioner, RemoteSandboxSettings};
