use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::movement::{Movement, MovementDetail};
use crate::types::{Allocation, DebitStatus, MovementId};

/// balance computed from a member's movement history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct BalanceSummary {
    pub total_debits: Money,
    pub total_credits: Money,
    /// positive = debt owed by the member, negative = credit in their favor
    pub balance: Money,
}

/// compute the member balance from movements; pure and idempotent.
/// debits increase the balance, credits decrease it, regardless of order.
pub fn calculate_balance(movements: &[Movement]) -> BalanceSummary {
    let total_debits: Money = movements
        .iter()
        .filter(|m| m.is_debit())
        .map(|m| m.amount)
        .sum();
    let total_credits: Money = movements
        .iter()
        .filter(|m| m.is_credit())
        .map(|m| m.amount)
        .sum();

    BalanceSummary {
        total_debits,
        total_credits,
        balance: total_debits - total_credits,
    }
}

/// paid amount of a debit, derived by summing allocations pointing to it
/// across all credits; never read from the cached field
pub fn derived_paid_amount(movements: &[Movement], debit_id: MovementId) -> Money {
    movements
        .iter()
        .flat_map(|m| m.allocations().iter())
        .filter(|a| a.debit_id == debit_id)
        .map(|a| a.amount)
        .sum()
}

/// outstanding debt: unpaid remainder of every debit still in play.
/// cancelled and refinanced debits are superseded and excluded.
pub fn outstanding_debt(movements: &[Movement]) -> Money {
    movements
        .iter()
        .filter(|m| {
            matches!(
                m.debit_status(),
                Some(DebitStatus::Pendiente) | Some(DebitStatus::Parcial)
            )
        })
        .map(|m| m.amount - derived_paid_amount(movements, m.id))
        .sum()
}

/// total credit sitting unallocated across all credits (member's favor)
pub fn unallocated_credit(movements: &[Movement]) -> Money {
    movements
        .iter()
        .filter(|m| m.is_credit())
        .map(|m| unallocated_amount(m))
        .sum()
}

/// unallocated remainder of a single credit
pub fn unallocated_amount(credit: &Movement) -> Money {
    let allocated: Money = credit.allocations().iter().map(|a| a.amount).sum();
    credit.amount - allocated
}

/// settlement status implied by an amount/paid pair
pub fn derive_debit_status(amount: Money, paid: Money) -> DebitStatus {
    if paid >= amount {
        DebitStatus::Cancelado
    } else if paid.is_positive() {
        DebitStatus::Parcial
    } else {
        DebitStatus::Pendiente
    }
}

/// apply part of a credit against a debit.
///
/// guards: the amount must be positive, within the credit's unallocated
/// remainder, and within the debit's remaining balance. on success the
/// debit's cached paid amount and status are resynced.
pub fn allocate(credit: &mut Movement, debit: &mut Movement, amount: Money) -> Result<()> {
    if !amount.is_positive() {
        return Err(LedgerError::InvalidAmount { amount });
    }

    let available = unallocated_amount(credit);
    if amount > available {
        return Err(LedgerError::InsufficientCredit {
            available,
            requested: amount,
        });
    }

    let debit_amount = debit.amount;
    let (_, _, paid) = debit.debit_mut()?;
    let remaining = debit_amount - *paid;
    if amount > remaining {
        return Err(LedgerError::OverAllocation {
            remaining,
            requested: amount,
        });
    }

    let debit_id = debit.id;
    credit.allocations_mut()?.push(Allocation { debit_id, amount });

    let (status, _, paid) = debit.debit_mut()?;
    *paid += amount;
    *status = derive_debit_status(debit_amount, *paid);

    Ok(())
}

/// remove only the allocations targeting the given debits from a credit,
/// returning the total stripped. unrelated allocations are untouched.
pub fn strip_allocations(credit: &mut Movement, debit_ids: &[MovementId]) -> Result<Money> {
    let allocations = credit.allocations_mut()?;
    let mut stripped = Money::ZERO;
    allocations.retain(|a| {
        if debit_ids.contains(&a.debit_id) {
            stripped += a.amount;
            false
        } else {
            true
        }
    });
    Ok(stripped)
}

/// defensive check: every debit's cached paid amount must match the
/// allocation-derived value, and no credit may be over-allocated
pub fn verify_allocation_invariants(movements: &[Movement]) -> Result<()> {
    for m in movements {
        match &m.detail {
            MovementDetail::Debit { paid_amount, .. } => {
                let derived = derived_paid_amount(movements, m.id);
                if derived != *paid_amount {
                    return Err(LedgerError::AllocationMismatch {
                        id: m.id,
                        cached: *paid_amount,
                        derived,
                    });
                }
            }
            MovementDetail::Credit { .. } => {
                if unallocated_amount(m).is_negative() {
                    return Err(LedgerError::InsufficientCredit {
                        available: unallocated_amount(m),
                        requested: Money::ZERO,
                    });
                }
            }
        }
    }
    Ok(())
}
