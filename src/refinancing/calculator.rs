use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};

pub const MIN_INSTALLMENTS: u32 = 1;
pub const MAX_INSTALLMENTS: u32 = 12;

/// one scheduled installment as computed, before any plan exists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentSpec {
    pub number: u32,
    pub due_date: NaiveDate,
    pub amount: Money,
}

/// calculator output: down payment plus a rounding-exact schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinancingTerms {
    pub principal: Money,
    pub down_payment_percent: u32,
    pub down_payment_amount: Money,
    /// base installment before the rounding adjustment
    pub installment_amount: Money,
    pub schedule: Vec<InstallmentSpec>,
    pub total_in_installments: Money,
    /// how many leading installments carry one extra unit
    pub adjustment_units: u32,
    pub start_due_date: NaiveDate,
}

/// compute down payment and installment schedule.
///
/// the down payment is `round(principal * percent / 100)`; the remainder is
/// split with floor division and the leftover units land on the earliest
/// installments, so the schedule always sums exactly to the remainder. due
/// dates advance by calendar months, clamping to the last day when the
/// target month is shorter.
pub fn calculate(
    principal: Money,
    down_payment_percent: u32,
    installments: u32,
    start_due_date: NaiveDate,
) -> Result<RefinancingTerms> {
    if !principal.is_positive() {
        return Err(LedgerError::InvalidPrincipal { amount: principal });
    }
    if !(MIN_INSTALLMENTS..=MAX_INSTALLMENTS).contains(&installments) {
        return Err(LedgerError::InstallmentsOutOfRange {
            installments,
            min: MIN_INSTALLMENTS,
            max: MAX_INSTALLMENTS,
        });
    }
    if down_payment_percent > 100 {
        return Err(LedgerError::DownPaymentOutOfRange {
            percent: down_payment_percent,
        });
    }

    let down_payment_amount = principal.percentage(Decimal::from(down_payment_percent));
    let remaining = principal - down_payment_amount;
    let base = remaining.div_floor(installments);
    let remainder = remaining - base * Decimal::from(installments);
    let adjustment_units = remainder
        .as_decimal()
        .to_u32()
        .ok_or(LedgerError::InvalidAmount { amount: remainder })?;

    let mut schedule = Vec::with_capacity(installments as usize);
    for number in 1..=installments {
        let amount = if number <= adjustment_units {
            base + Money::ONE
        } else {
            base
        };
        schedule.push(InstallmentSpec {
            number,
            due_date: add_months_clamped(start_due_date, number - 1)?,
            amount,
        });
    }

    let total_in_installments: Money = schedule.iter().map(|i| i.amount).sum();
    if down_payment_amount + total_in_installments != principal {
        return Err(LedgerError::ScheduleSumMismatch {
            down_payment: down_payment_amount,
            installments_total: total_in_installments,
            principal,
        });
    }

    Ok(RefinancingTerms {
        principal,
        down_payment_percent,
        down_payment_amount,
        installment_amount: base,
        schedule,
        total_in_installments,
        adjustment_units,
        start_due_date,
    })
}

/// advance by calendar months, preserving day-of-month where the target
/// month has that day, otherwise clamping to the month's last day
pub fn add_months_clamped(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    let total = date.year() * 12 + date.month0() as i32 + months as i32;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    let day = date.day().min(days_in_month(year, month));

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| LedgerError::InvalidDate {
        message: format!("{}-{:02}-{:02} is not a valid date", year, month, day),
    })
}

/// last calendar day of a month
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 30,
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}
