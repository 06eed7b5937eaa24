use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{BatchId, MemberId, RefinancingId, RefinancingStatus};

/// all events that can be emitted by ledger operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // refinancing lifecycle events
    RefinancingDrafted {
        refinancing_id: RefinancingId,
        member_id: MemberId,
        principal: Money,
        installments: u32,
        timestamp: DateTime<Utc>,
    },
    RefinancingSentToBoard {
        refinancing_id: RefinancingId,
        document_ref: String,
        timestamp: DateTime<Utc>,
    },
    RefinancingApproved {
        refinancing_id: RefinancingId,
        approved_by: String,
        timestamp: DateTime<Utc>,
    },
    RefinancingRejected {
        refinancing_id: RefinancingId,
        rejected_by: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    RefinancingExecuted {
        refinancing_id: RefinancingId,
        member_id: MemberId,
        debits_superseded: u32,
        installments_created: u32,
        down_payment_applied: Money,
        timestamp: DateTime<Utc>,
    },
    RefinancingRolledBack {
        refinancing_id: RefinancingId,
        member_id: MemberId,
        credits_reassigned: Money,
        leftover_credit: Money,
        timestamp: DateTime<Utc>,
    },
    RefinancingAbandoned {
        refinancing_id: RefinancingId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    RefinancingCompleted {
        refinancing_id: RefinancingId,
        timestamp: DateTime<Utc>,
    },
    StatusChanged {
        refinancing_id: RefinancingId,
        old_status: RefinancingStatus,
        new_status: RefinancingStatus,
        timestamp: DateTime<Utc>,
    },

    // quota events
    QuotasGenerated {
        member_id: MemberId,
        year: i32,
        months_generated: Vec<u32>,
        batch_id: BatchId,
        timestamp: DateTime<Utc>,
    },
    DuplicateQuotaDetected {
        member_id: MemberId,
        year: i32,
        month: u32,
    },
    QuotaBatchReverted {
        member_id: MemberId,
        batch_id: BatchId,
        reverted: u32,
        skipped: u32,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// action recorded in a refinancing audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    DraftCreated,
    SentToBoard,
    Approved,
    Rejected,
    Executed,
    CancelledWithRollback,
    Abandoned,
    Completed,
}

/// append-only audit trail entry; one per state transition, never rewritten
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub user_id: String,
    pub details: String,
}

impl AuditEntry {
    pub fn new(
        action: AuditAction,
        user_id: impl Into<String>,
        details: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            action,
            user_id: user_id.into(),
            details: details.into(),
        }
    }
}

/// summary of a rollback, returned by cancel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackSummary {
    pub refinancing_id: RefinancingId,
    pub installments_removed: u32,
    pub debits_restored: u32,
    pub credits_reassigned: Money,
    pub leftover_credit: Money,
    pub earliest_restored_due: Option<NaiveDate>,
}
