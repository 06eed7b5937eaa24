use thiserror::Error;
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{MemberId, MovementId, RefinancingStatus};

#[derive(Error, Debug)]
pub enum LedgerError {
    // validation errors: bad input shape or range, never mutate state
    #[error("invalid principal: {amount}")]
    InvalidPrincipal { amount: Money },

    #[error("installments out of range: {installments} (allowed {min}..={max})")]
    InstallmentsOutOfRange {
        installments: u32,
        min: u32,
        max: u32,
    },

    #[error("down payment percent out of range: {percent}")]
    DownPaymentOutOfRange { percent: u32 },

    #[error("invalid date: {message}")]
    InvalidDate { message: String },

    #[error("invalid amount: {amount}")]
    InvalidAmount { amount: Money },

    // state errors: illegal transition, rejected before any mutation
    #[error("cannot {action} a refinancing in status {status:?}")]
    InvalidTransition {
        status: RefinancingStatus,
        action: &'static str,
    },

    // referential errors
    #[error("movement not found: {id}")]
    MovementNotFound { id: MovementId },

    #[error("refinancing not found: {id}")]
    RefinancingNotFound { id: Uuid },

    #[error("member not found: {id}")]
    MemberNotFound { id: MemberId },

    #[error("movement {id} does not belong to member {member_id}")]
    MovementNotOwned {
        id: MovementId,
        member_id: MemberId,
    },

    #[error("movement {id} is not a debit")]
    NotADebit { id: MovementId },

    #[error("movement {id} is not a credit")]
    NotACredit { id: MovementId },

    #[error("debit {id} is referenced by credit allocations and cannot be deleted")]
    DebitReferenced { id: MovementId },

    // allocation guards
    #[error("allocation exceeds debit remaining balance: remaining {remaining}, requested {requested}")]
    OverAllocation {
        remaining: Money,
        requested: Money,
    },

    #[error("credit has insufficient unallocated funds: available {available}, requested {requested}")]
    InsufficientCredit {
        available: Money,
        requested: Money,
    },

    // consistency errors: defensive checks against invariant breakage
    #[error("schedule sum mismatch: down payment {down_payment} + installments {installments_total} != principal {principal}")]
    ScheduleSumMismatch {
        down_payment: Money,
        installments_total: Money,
        principal: Money,
    },

    #[error("allocation bookkeeping mismatch for debit {id}: cached {cached}, derived {derived}")]
    AllocationMismatch {
        id: MovementId,
        cached: Money,
        derived: Money,
    },
}

pub type Result<T> = std::result::Result<T, LedgerError>;
