pub mod calculator;
pub mod lifecycle;
pub mod validator;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::events::AuditEntry;
use crate::movement::Movement;
use crate::types::{InstallmentStatus, MemberId, MovementId, RefinancingId, RefinancingStatus};

pub use calculator::{calculate, InstallmentSpec, RefinancingTerms};
pub use lifecycle::RefinancingEngine;
pub use validator::{validate, ValidationIssue, ValidationReport};

/// point-in-time copy of an original debit, captured at draft creation.
/// this is the sole rollback anchor and is never recomputed, even if the
/// live debit changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebitSnapshot {
    pub movement_id: MovementId,
    pub amount: Money,
    pub paid_amount: Money,
    pub due_date: Option<NaiveDate>,
    pub concept: String,
    pub date: NaiveDate,
}

impl DebitSnapshot {
    /// capture the debit's current state verbatim
    pub fn capture(movement: &Movement) -> Self {
        Self {
            movement_id: movement.id,
            amount: movement.amount,
            paid_amount: movement.paid_amount(),
            due_date: movement.due_date(),
            concept: movement.concept.clone(),
            date: movement.date,
        }
    }
}

/// one scheduled payment within a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub number: u32,
    pub due_date: NaiveDate,
    pub amount: Money,
    pub status: InstallmentStatus,
    pub paid_amount: Money,
    /// the debit materialized for this installment at execution
    pub movement_id: Option<MovementId>,
}

impl Installment {
    fn from_spec(spec: &InstallmentSpec) -> Self {
        Self {
            number: spec.number,
            due_date: spec.due_date,
            amount: spec.amount,
            status: InstallmentStatus::Pendiente,
            paid_amount: Money::ZERO,
            movement_id: None,
        }
    }
}

/// board decision record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub decided_by: String,
    pub decided_at: DateTime<Utc>,
    pub approved: bool,
    pub reason: Option<String>,
}

/// a plan restructuring one or more debits into an installment schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refinancing {
    pub id: RefinancingId,
    pub member_id: MemberId,

    pub original_debit_ids: Vec<MovementId>,
    pub original_debits_snapshot: Vec<DebitSnapshot>,

    pub principal: Money,
    pub down_payment_percent: u32,
    pub down_payment_amount: Money,
    pub installments: u32,
    pub installment_amount: Money,
    pub start_due_date: NaiveDate,

    pub schedule: Vec<Installment>,
    pub status: RefinancingStatus,

    pub sent_to_board: bool,
    pub board_document_ref: Option<String>,
    pub approval: Option<ApprovalRecord>,
    pub observations: Option<String>,

    /// append-only; one entry per state transition
    pub audit_trail: Vec<AuditEntry>,
    pub created_at: DateTime<Utc>,
}

impl Refinancing {
    pub(crate) fn from_terms(
        member_id: MemberId,
        original_debit_ids: Vec<MovementId>,
        snapshot: Vec<DebitSnapshot>,
        terms: &RefinancingTerms,
        observations: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            member_id,
            original_debit_ids,
            original_debits_snapshot: snapshot,
            principal: terms.principal,
            down_payment_percent: terms.down_payment_percent,
            down_payment_amount: terms.down_payment_amount,
            installments: terms.schedule.len() as u32,
            installment_amount: terms.installment_amount,
            start_due_date: terms.start_due_date,
            schedule: terms.schedule.iter().map(Installment::from_spec).collect(),
            status: RefinancingStatus::Draft,
            sent_to_board: false,
            board_document_ref: None,
            approval: None,
            observations,
            audit_trail: Vec::new(),
            created_at,
        }
    }

    /// debit movement ids materialized for the schedule (execution onwards)
    pub fn installment_movement_ids(&self) -> Vec<MovementId> {
        self.schedule
            .iter()
            .filter_map(|i| i.movement_id)
            .collect()
    }

    pub fn record_audit(&mut self, entry: AuditEntry) {
        self.audit_trail.push(entry);
    }
}
