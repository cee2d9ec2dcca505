// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the prgate CLI

pub mod config;
pub mod exec;
pub mod policy;

pub use self::config::ConfigCommand;
pub use self::exec::ExecArgs;
pub use self::policy::{CheckArgs, NormalizeArgs, RedactArgs};
