use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::types::{
    Allocation, BatchId, DebitStatus, MemberId, MovementId, MovementKind, Origin, QuotaTag,
    RefinancingId,
};

/// a ledger entry, immutable once settled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub member_id: MemberId,
    /// posting date (payment date for credits)
    pub date: NaiveDate,
    pub amount: Money,
    pub origin: Origin,
    pub concept: String,
    pub observations: Option<String>,
    pub detail: MovementDetail,

    // traceability
    pub refinancing_id: Option<RefinancingId>,
    pub quota_tag: Option<QuotaTag>,
    pub batch_id: Option<BatchId>,
}

/// kind-specific movement state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MovementDetail {
    Debit {
        status: DebitStatus,
        due_date: Option<NaiveDate>,
        /// cache of the allocation-derived total; the ledger resyncs it on
        /// every allocation write
        paid_amount: Money,
    },
    Credit {
        allocations: Vec<Allocation>,
    },
}

impl Movement {
    /// create a pending debit
    pub fn debit(
        member_id: MemberId,
        date: NaiveDate,
        amount: Money,
        origin: Origin,
        concept: impl Into<String>,
        due_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            member_id,
            date,
            amount,
            origin,
            concept: concept.into(),
            observations: None,
            detail: MovementDetail::Debit {
                status: DebitStatus::Pendiente,
                due_date,
                paid_amount: Money::ZERO,
            },
            refinancing_id: None,
            quota_tag: None,
            batch_id: None,
        }
    }

    /// create a credit with no allocations (a pure advance payment)
    pub fn credit(
        member_id: MemberId,
        date: NaiveDate,
        amount: Money,
        origin: Origin,
        concept: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            member_id,
            date,
            amount,
            origin,
            concept: concept.into(),
            observations: None,
            detail: MovementDetail::Credit {
                allocations: Vec::new(),
            },
            refinancing_id: None,
            quota_tag: None,
            batch_id: None,
        }
    }

    pub fn kind(&self) -> MovementKind {
        match self.detail {
            MovementDetail::Debit { .. } => MovementKind::Debit,
            MovementDetail::Credit { .. } => MovementKind::Credit,
        }
    }

    pub fn is_debit(&self) -> bool {
        self.kind() == MovementKind::Debit
    }

    pub fn is_credit(&self) -> bool {
        self.kind() == MovementKind::Credit
    }

    /// debit status, if this is a debit
    pub fn debit_status(&self) -> Option<DebitStatus> {
        match &self.detail {
            MovementDetail::Debit { status, .. } => Some(*status),
            MovementDetail::Credit { .. } => None,
        }
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        match &self.detail {
            MovementDetail::Debit { due_date, .. } => *due_date,
            MovementDetail::Credit { .. } => None,
        }
    }

    /// cached paid amount for debits, zero for credits
    pub fn paid_amount(&self) -> Money {
        match &self.detail {
            MovementDetail::Debit { paid_amount, .. } => *paid_amount,
            MovementDetail::Credit { .. } => Money::ZERO,
        }
    }

    /// allocations carried by a credit
    pub fn allocations(&self) -> &[Allocation] {
        match &self.detail {
            MovementDetail::Credit { allocations } => allocations,
            MovementDetail::Debit { .. } => &[],
        }
    }

    /// mutable access to debit state, or a referential error
    pub fn debit_mut(&mut self) -> Result<(&mut DebitStatus, &mut Option<NaiveDate>, &mut Money)> {
        let id = self.id;
        match &mut self.detail {
            MovementDetail::Debit {
                status,
                due_date,
                paid_amount,
            } => Ok((status, due_date, paid_amount)),
            MovementDetail::Credit { .. } => Err(LedgerError::NotADebit { id }),
        }
    }

    /// mutable access to credit allocations, or a referential error
    pub fn allocations_mut(&mut self) -> Result<&mut Vec<Allocation>> {
        let id = self.id;
        match &mut self.detail {
            MovementDetail::Credit { allocations } => Ok(allocations),
            MovementDetail::Debit { .. } => Err(LedgerError::NotACredit { id }),
        }
    }

    pub fn with_refinancing(mut self, refinancing_id: RefinancingId) -> Self {
        self.refinancing_id = Some(refinancing_id);
        self
    }

    pub fn with_quota_tag(mut self, tag: QuotaTag, batch_id: BatchId) -> Self {
        self.quota_tag = Some(tag);
        self.batch_id = Some(batch_id);
        self
    }

    pub fn with_observations(mut self, observations: impl Into<String>) -> Self {
        self.observations = Some(observations.into());
        self
    }
}
