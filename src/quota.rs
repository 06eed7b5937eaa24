use chrono::{Datelike, NaiveDate};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::QuotaConfig;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::ledger::derived_paid_amount;
use crate::movement::Movement;
use crate::refinancing::calculator::days_in_month;
use crate::store::{LedgerStore, MemberProfile};
use crate::types::{BatchId, DebitStatus, MemberId, MovementId, Origin, QuotaTag};

/// per member/year view of which monthly quota charges exist and which are
/// missing. ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyQuotaAnalysis {
    pub member_id: MemberId,
    pub year: i32,
    pub exempt: bool,
    /// None when the member owes nothing for this year (exempt, or joined
    /// after it)
    pub first_chargeable_month: Option<u32>,
    pub covered_months: Vec<u32>,
    pub missing_months: Vec<u32>,
    /// months matched by more than one debit; reported, never fatal
    pub duplicate_months: Vec<u32>,
    pub price: Money,
}

/// outcome of reverting a generation batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRevertOutcome {
    pub batch_id: BatchId,
    pub reverted: Vec<MovementId>,
    /// debits left in place because they were already paid or no longer
    /// pending
    pub skipped: Vec<MovementId>,
}

/// determine which calendar months of the year lack a monthly quota debit.
///
/// matching precedence per debit: the structured tag written by this
/// generator, then a month-name + year parse of the concept/observations,
/// then the due date as a last resort.
pub fn analyze(
    member: &MemberProfile,
    movements: &[Movement],
    year: i32,
    price: Money,
    config: &QuotaConfig,
) -> MonthlyQuotaAnalysis {
    if config.is_exempt(&member.subcategory) {
        return MonthlyQuotaAnalysis {
            member_id: member.id,
            year,
            exempt: true,
            first_chargeable_month: None,
            covered_months: Vec::new(),
            missing_months: Vec::new(),
            duplicate_months: Vec::new(),
            price,
        };
    }

    // charge from january, or from the join month when the member joined
    // during the target year
    let first_chargeable_month = if member.join_date.year() > year {
        None
    } else if member.join_date.year() == year {
        Some(member.join_date.month())
    } else {
        Some(1)
    };

    let mut matches_per_month = [0u32; 12];
    for movement in movements {
        if !movement.is_debit() {
            continue;
        }
        // installment debits of a refinancing plan also carry origin Quota
        if movement.refinancing_id.is_some() {
            continue;
        }
        if movement.origin != Origin::Quota && movement.quota_tag.is_none() {
            continue;
        }
        if let Some(month) = match_month(movement, year) {
            matches_per_month[(month - 1) as usize] += 1;
        }
    }

    let covered_months: Vec<u32> = (1..=12u32)
        .filter(|&m| matches_per_month[(m - 1) as usize] > 0)
        .collect();
    let duplicate_months: Vec<u32> = (1..=12u32)
        .filter(|&m| matches_per_month[(m - 1) as usize] > 1)
        .collect();
    let missing_months: Vec<u32> = match first_chargeable_month {
        Some(first) => (first..=12u32)
            .filter(|&m| matches_per_month[(m - 1) as usize] == 0)
            .collect(),
        None => Vec::new(),
    };

    MonthlyQuotaAnalysis {
        member_id: member.id,
        year,
        exempt: false,
        first_chargeable_month,
        covered_months,
        missing_months,
        duplicate_months,
        price,
    }
}

/// resolve which month of the target year a quota debit belongs to
fn match_month(movement: &Movement, year: i32) -> Option<u32> {
    if let Some(tag) = movement.quota_tag {
        return (tag.year == year).then_some(tag.month);
    }

    let mut text = movement.concept.to_lowercase();
    if let Some(obs) = &movement.observations {
        text.push(' ');
        text.push_str(&obs.to_lowercase());
    }
    if text.contains(&year.to_string()) {
        if let Some(month) = parse_month_name(&text) {
            return Some(month);
        }
    }

    match movement.due_date() {
        Some(due) if due.year() == year => Some(due.month()),
        _ => None,
    }
}

const MONTH_NAMES: [(&str, u32); 13] = [
    ("enero", 1),
    ("febrero", 2),
    ("marzo", 3),
    ("abril", 4),
    ("mayo", 5),
    ("junio", 6),
    ("julio", 7),
    ("agosto", 8),
    ("septiembre", 9),
    ("setiembre", 9),
    ("octubre", 10),
    ("noviembre", 11),
    ("diciembre", 12),
];

fn parse_month_name(text: &str) -> Option<u32> {
    MONTH_NAMES
        .iter()
        .find(|(name, _)| text.contains(name))
        .map(|(_, month)| *month)
}

fn month_name(month: u32) -> &'static str {
    MONTH_NAMES
        .iter()
        .find(|(_, m)| *m == month)
        .map(|(name, _)| *name)
        .unwrap_or("")
}

/// produce one pending debit per missing month, dated the first of the
/// month and due its last calendar day, all carrying the same batch id so
/// the run can be identified and reverted
pub fn materialize(analysis: &MonthlyQuotaAnalysis, batch_id: BatchId) -> Result<Vec<Movement>> {
    let mut movements = Vec::with_capacity(analysis.missing_months.len());
    for &month in &analysis.missing_months {
        let first_day =
            NaiveDate::from_ymd_opt(analysis.year, month, 1).ok_or(LedgerError::InvalidDate {
                message: format!("{}-{:02}-01 is not a valid date", analysis.year, month),
            })?;
        let last_day = NaiveDate::from_ymd_opt(
            analysis.year,
            month,
            days_in_month(analysis.year, month),
        )
        .ok_or(LedgerError::InvalidDate {
            message: format!("no last day for {}-{:02}", analysis.year, month),
        })?;

        movements.push(
            Movement::debit(
                analysis.member_id,
                first_day,
                analysis.price,
                Origin::Quota,
                format!("Cuota social {} {}", month_name(month), analysis.year),
                Some(last_day),
            )
            .with_quota_tag(
                QuotaTag {
                    year: analysis.year,
                    month,
                },
                batch_id,
            ),
        );
    }
    Ok(movements)
}

/// full generation run: analyze, materialize, append
pub fn generate_annual_quotas<S: LedgerStore>(
    store: &mut S,
    member: &MemberProfile,
    year: i32,
    price: Money,
    config: &QuotaConfig,
    time: &SafeTimeProvider,
    events: &mut EventStore,
) -> Result<(MonthlyQuotaAnalysis, BatchId, Vec<Movement>)> {
    let movements = store.movements_for_member(member.id)?;
    let analysis = analyze(member, &movements, year, price, config);

    for &month in &analysis.duplicate_months {
        events.emit(Event::DuplicateQuotaDetected {
            member_id: member.id,
            year,
            month,
        });
    }

    let batch_id = Uuid::new_v4();
    let generated = materialize(&analysis, batch_id)?;
    for movement in generated.iter().cloned() {
        store.append_movement(movement)?;
    }

    events.emit(Event::QuotasGenerated {
        member_id: member.id,
        year,
        months_generated: analysis.missing_months.clone(),
        batch_id,
        timestamp: time.now(),
    });

    Ok((analysis, batch_id, generated))
}

/// revert a generation batch. only debits still Pendiente with zero paid
/// amount are removed; anything touched by a payment stays.
pub fn revert_batch<S: LedgerStore>(
    store: &mut S,
    member_id: MemberId,
    batch_id: BatchId,
    time: &SafeTimeProvider,
    events: &mut EventStore,
) -> Result<BatchRevertOutcome> {
    let movements = store.movements_for_member(member_id)?;

    let mut reverted = Vec::new();
    let mut skipped = Vec::new();
    for movement in &movements {
        if movement.batch_id != Some(batch_id) || !movement.is_debit() {
            continue;
        }
        let untouched = movement.debit_status() == Some(DebitStatus::Pendiente)
            && derived_paid_amount(&movements, movement.id).is_zero();
        if untouched {
            reverted.push(movement.id);
        } else {
            skipped.push(movement.id);
        }
    }

    for &id in &reverted {
        store.remove_movement(id)?;
    }

    events.emit(Event::QuotaBatchReverted {
        member_id,
        batch_id,
        reverted: reverted.len() as u32,
        skipped: skipped.len() as u32,
        timestamp: time.now(),
    });

    Ok(BatchRevertOutcome {
        batch_id,
        reverted,
        skipped,
    })
}
