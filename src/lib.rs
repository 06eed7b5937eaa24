pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod movement;
pub mod quota;
pub mod refinancing;
pub mod store;
pub mod types;

// re-export key types
pub use config::{QuotaConfig, RefinancingPolicy};
pub use decimal::Money;
pub use errors::{LedgerError, Result};
pub use events::{AuditAction, AuditEntry, Event, EventStore, RollbackSummary};
pub use ledger::{
    allocate, calculate_balance, derived_paid_amount, outstanding_debt, unallocated_credit,
    BalanceSummary,
};
pub use movement::{Movement, MovementDetail};
pub use quota::{
    analyze, generate_annual_quotas, materialize, revert_batch, BatchRevertOutcome,
    MonthlyQuotaAnalysis,
};
pub use refinancing::{
    calculate, validate, InstallmentSpec, Refinancing, RefinancingEngine, RefinancingTerms,
    ValidationIssue, ValidationReport,
};
pub use store::{InMemoryMembers, InMemoryStore, LedgerStore, MemberDirectory, MemberProfile};
pub use types::{
    Allocation, BatchId, DebitStatus, InstallmentStatus, MemberId, MovementId, MovementKind,
    Origin, QuotaTag, RefinancingId, RefinancingStatus,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
