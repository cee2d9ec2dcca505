// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! prgate core
//!
//! Policy gateway between an automated agent and disposable code workspaces:
//! command validation, path confinement, secret redaction, approval-gated
//! pushes and pull requests.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, application services and backend adapters

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::Gateway;
pub use domain::errors::{GatewayError, GatewayResult};
