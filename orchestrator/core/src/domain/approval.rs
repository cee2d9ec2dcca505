// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Approval Records
//!
//! An approval authorises a fixed set of irreversible actions for one
//! reviewed change set. Each action fires at most once per approval.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Approval token, gated action kinds and the approved payload snapshot

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalId(pub Uuid);

impl ApprovalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ApprovalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ApprovalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Irreversible action kinds an approval can authorise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatedAction {
    Push,
    OpenPr,
}

impl GatedAction {
    pub const ALL: [GatedAction; 2] = [GatedAction::Push, GatedAction::OpenPr];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::OpenPr => "open_pr",
        }
    }
}

impl fmt::Display for GatedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatedAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(Self::Push),
            "open_pr" => Ok(Self::OpenPr),
            other => Err(format!("Unknown gated action: {other}")),
        }
    }
}

/// What the reviewer saw when approving.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApprovalPayload {
    pub summary: String,
    pub unified_diff: String,
    #[serde(default)]
    pub checks: serde_json::Value,
    #[serde(default)]
    pub branch_plan: serde_json::Value,
    #[serde(default)]
    pub pr_draft: bool,
    #[serde(default)]
    pub pr_title: String,
    #[serde(default)]
    pub pr_body: String,
    #[serde(default)]
    pub issue_url: Option<String>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: ApprovalId,
    pub approved: bool,
    pub allowed: BTreeSet<GatedAction>,
    pub consumed: BTreeSet<GatedAction>,
    pub payload: ApprovalPayload,
    pub created_at: DateTime<Utc>,
}

impl ApprovalRecord {
    /// An approved record authorising every [`GatedAction`], none consumed.
    pub fn approved(payload: ApprovalPayload) -> Self {
        Self {
            id: ApprovalId::new(),
            approved: true,
            allowed: GatedAction::ALL.into_iter().collect(),
            consumed: BTreeSet::new(),
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn can_consume(&self, action: GatedAction) -> bool {
        self.approved && self.allowed.contains(&action) && !self.consumed.contains(&action)
    }

    /// Mark `action` consumed. Returns false if it was not consumable.
    pub fn consume(&mut self, action: GatedAction) -> bool {
        if !self.can_consume(action) {
            return false;
        }
        self.consumed.insert(action)
    }

    /// Every allowed action has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.allowed.is_subset(&self.consumed)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at > ttl
    }
}

/// Result of an approval request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<ApprovalId>,
    pub notes: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gated_action_names() {
        assert_eq!("push".parse::<GatedAction>().unwrap(), GatedAction::Push);
        assert_eq!("open_pr".parse::<GatedAction>().unwrap(), GatedAction::OpenPr);
        assert!("merge".parse::<GatedAction>().is_err());
        assert_eq!(
            serde_json::to_string(&GatedAction::OpenPr).unwrap(),
            "\"open_pr\""
        );
    }

    #[test]
    fn test_record_consumption() {
        let mut record = ApprovalRecord::approved(ApprovalPayload::default());
        assert!(!record.is_exhausted());
        assert!(record.consume(GatedAction::Push));
        assert!(!record.consume(GatedAction::Push));
        assert!(!record.is_exhausted());
        assert!(record.consume(GatedAction::OpenPr));
        assert!(record.is_exhausted());
    }

    #[test]
    fn test_unapproved_record_never_consumes() {
        let mut record = ApprovalRecord::approved(ApprovalPayload::default());
        record.approved = false;
        assert!(!record.consume(GatedAction::Push));
    }

    #[test]
    fn test_record_expiry() {
        let record = ApprovalRecord::approved(ApprovalPayload::default());
        let ttl = Duration::minutes(10);
        assert!(!record.is_expired_at(record.created_at + Duration::minutes(10), ttl));
        assert!(record.is_expired_at(record.created_at + Duration::minutes(11), ttl));
    }
}
