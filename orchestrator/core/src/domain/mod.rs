// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Pure policy types and functions. Nothing here holds shared state or
//! performs I/O beyond configuration file loading.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Policies, value objects and the backend capability traits

pub mod approval;
pub mod backend;
pub mod command_policy;
pub mod config;
pub mod errors;
pub mod patch;
pub mod path_sanitizer;
pub mod redaction;
pub mod repo_policy;
pub mod workspace;
