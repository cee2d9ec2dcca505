// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod approval_ledger;
pub mod edit_service;
pub mod gateway;
pub mod pull_request;
pub mod repo_service;
pub mod workspace_registry;

// Re-export the composition root for convenience
pub use gateway::Gateway;
pub use workspace_registry::{CommandResult, RegistrySettings, WorkspaceRegistry};
