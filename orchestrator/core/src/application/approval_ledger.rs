// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Approval Ledger - single-use-per-action approval tokens
//!
//! One approval authorises both a push and a pull request for the same
//! reviewed change set; each action can be consumed once. A record is
//! removed as soon as every action it allows has been consumed, or lazily
//! once it outlives the approval TTL.

use chrono::{Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::domain::approval::{
    ApprovalDecision, ApprovalId, ApprovalPayload, ApprovalRecord, GatedAction,
};

pub struct ApprovalLedger {
    records: Mutex<HashMap<ApprovalId, ApprovalRecord>>,
    ttl: Duration,
}

impl ApprovalLedger {
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Record a decision. Only an approval creates a record.
    pub fn request(&self, payload: ApprovalPayload, approved: bool) -> ApprovalDecision {
        let notes = payload.notes.clone();
        if !approved {
            info!("Approval request rejected by reviewer");
            return ApprovalDecision {
                approved: false,
                approval_id: None,
                notes,
            };
        }

        let record = ApprovalRecord::approved(payload);
        let id = record.id;
        self.records.lock().insert(id, record);

        info!(approval_id = %id, ttl_minutes = self.ttl.num_minutes(), "Approval granted");
        ApprovalDecision {
            approved: true,
            approval_id: Some(id),
            notes,
        }
    }

    /// Consume `action` from the approval named by `token`.
    ///
    /// Returns false, with no effect, for an unknown or expired token, an
    /// unrecognised action or an action already consumed.
    pub fn consume(&self, token: &str, action: &str) -> bool {
        let Ok(action) = action.parse::<GatedAction>() else {
            warn!(action = %action, "Unknown gated action");
            return false;
        };
        let Ok(id) = token.parse::<ApprovalId>() else {
            warn!(action = %action, "Malformed approval token");
            return false;
        };

        let mut records = self.records.lock();
        if self.evict_if_expired(&mut records, &id) {
            return false;
        }
        let Some(record) = records.get_mut(&id) else {
            warn!(approval_id = %id, action = %action, "Unknown approval token");
            return false;
        };

        if !record.consume(action) {
            warn!(approval_id = %id, action = %action, "Approval action already consumed");
            return false;
        }

        info!(approval_id = %id, action = %action, "Approval action consumed");
        if record.is_exhausted() {
            records.remove(&id);
            debug!(approval_id = %id, "Approval fully consumed; record removed");
        }
        true
    }

    /// Snapshot of a live record without consuming anything.
    pub fn peek(&self, token: &str) -> Option<ApprovalRecord> {
        let id = token.parse::<ApprovalId>().ok()?;
        let mut records = self.records.lock();
        if self.evict_if_expired(&mut records, &id) {
            return None;
        }
        records.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_if_expired(
        &self,
        records: &mut HashMap<ApprovalId, ApprovalRecord>,
        id: &ApprovalId,
    ) -> bool {
        let expired = records
            .get(id)
            .is_some_and(|r| r.is_expired_at(Utc::now(), self.ttl));
        if expired {
            records.remove(id);
            info!(approval_id = %id, "Approval expired; record removed");
        }
        expired
    }
}

impl Default for ApprovalLedger {
    fn default() -> Self {
        Self::new(Duration::minutes(1440))
    }
}
