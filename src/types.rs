use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;

/// unique identifier for a member
pub type MemberId = Uuid;

/// unique identifier for a ledger movement
pub type MovementId = Uuid;

/// unique identifier for a refinancing plan
pub type RefinancingId = Uuid;

/// unique identifier for a quota generation batch
pub type BatchId = Uuid;

/// ledger movement kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementKind {
    /// amount owed by the member
    Debit,
    /// amount paid or credited in the member's favor
    Credit,
}

/// settlement status of a debit movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebitStatus {
    /// unpaid
    Pendiente,
    /// partially covered by allocations
    Parcial,
    /// fully paid, or voided
    Cancelado,
    /// superseded by a refinancing plan
    Refinanciado,
}

/// source of a movement, for display and reconciliation only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    Service,
    Quota,
    Payment,
    Adjustment,
    Subscription,
    Refinancing,
}

/// status of a single installment within a refinancing schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallmentStatus {
    Pendiente,
    Pagada,
    Parcial,
    Vencida,
    Anulada,
}

/// refinancing plan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefinancingStatus {
    /// created, ledger untouched
    Draft,
    /// sent to the board for approval
    PendienteAprobacion,
    /// approved by the board, not yet executed
    Aprobada,
    /// executed against the ledger
    Activa,
    /// every installment fully paid
    Completada,
    /// abandoned before execution
    Cancelada,
    /// executed plan rolled back
    Anulada,
}

/// how much of a credit was applied to a specific debit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub debit_id: MovementId,
    pub amount: Money,
}

/// structured month marker written by the quota generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaTag {
    pub year: i32,
    pub month: u32,
}
