use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use std::collections::HashMap;

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::events::{AuditAction, AuditEntry, Event, EventStore, RollbackSummary};
use crate::ledger::{allocate, derive_debit_status, derived_paid_amount, strip_allocations};
use crate::movement::Movement;
use crate::store::LedgerStore;
use crate::types::{
    DebitStatus, InstallmentStatus, MemberId, MovementId, Origin, RefinancingId, RefinancingStatus,
};

use super::{DebitSnapshot, Refinancing, RefinancingTerms};

/// action driving a plan transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SendToBoard,
    Approve,
    Reject,
    Execute,
    Cancel,
    Abandon,
    Complete,
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Action::SendToBoard => "send to board",
            Action::Approve => "approve",
            Action::Reject => "reject",
            Action::Execute => "execute",
            Action::Cancel => "cancel",
            Action::Abandon => "abandon",
            Action::Complete => "complete",
        }
    }
}

/// central transition table; every illegal pair is rejected here, before
/// any mutation
pub fn transition(status: RefinancingStatus, action: Action) -> Result<RefinancingStatus> {
    use RefinancingStatus::*;

    match (status, action) {
        (Draft, Action::SendToBoard) => Ok(PendienteAprobacion),
        (PendienteAprobacion, Action::Approve) => Ok(Aprobada),
        (PendienteAprobacion, Action::Reject) => Ok(Cancelada),
        (Draft, Action::Execute) | (Aprobada, Action::Execute) => Ok(Activa),
        (Activa, Action::Cancel) => Ok(Anulada),
        (Draft, Action::Abandon)
        | (PendienteAprobacion, Action::Abandon)
        | (Aprobada, Action::Abandon) => Ok(Cancelada),
        (Activa, Action::Complete) => Ok(Completada),
        _ => Err(LedgerError::InvalidTransition {
            status,
            action: action.name(),
        }),
    }
}

/// orchestrates the refinancing lifecycle against a ledger store.
///
/// every multi-step operation stages its work on cloned movements and
/// commits only once nothing can fail, so a rejected operation leaves the
/// ledger untouched. callers must serialize operations per member.
pub struct RefinancingEngine<'a, S: LedgerStore> {
    store: &'a mut S,
    pub events: EventStore,
}

impl<'a, S: LedgerStore> RefinancingEngine<'a, S> {
    pub fn new(store: &'a mut S) -> Self {
        Self {
            store,
            events: EventStore::new(),
        }
    }

    /// create a draft plan from existing debits and calculator output.
    /// snapshots each referenced debit verbatim; the ledger is not touched.
    pub fn create_draft(
        &mut self,
        member_id: MemberId,
        original_debit_ids: &[MovementId],
        terms: &RefinancingTerms,
        observations: Option<String>,
        user: &str,
        time: &SafeTimeProvider,
    ) -> Result<Refinancing> {
        let movements = self.store.movements_for_member(member_id)?;
        let by_id: HashMap<MovementId, &Movement> = movements.iter().map(|m| (m.id, m)).collect();

        let mut snapshot = Vec::with_capacity(original_debit_ids.len());
        for &id in original_debit_ids {
            let movement = by_id
                .get(&id)
                .copied()
                .ok_or(LedgerError::MovementNotFound { id })?;
            if movement.member_id != member_id {
                return Err(LedgerError::MovementNotOwned { id, member_id });
            }
            if !movement.is_debit() {
                return Err(LedgerError::NotADebit { id });
            }
            let mut snap = DebitSnapshot::capture(movement);
            // the cached field is never trusted; the snapshot carries the
            // allocation-derived value
            snap.paid_amount = derived_paid_amount(&movements, id);
            snapshot.push(snap);
        }

        let now = time.now();
        let mut refinancing = Refinancing::from_terms(
            member_id,
            original_debit_ids.to_vec(),
            snapshot,
            terms,
            observations,
            now,
        );
        refinancing.record_audit(AuditEntry::new(
            AuditAction::DraftCreated,
            user,
            format!(
                "principal {} over {} installments, {}% down",
                terms.principal,
                terms.schedule.len(),
                terms.down_payment_percent
            ),
            now,
        ));

        self.events.emit(Event::RefinancingDrafted {
            refinancing_id: refinancing.id,
            member_id,
            principal: terms.principal,
            installments: terms.schedule.len() as u32,
            timestamp: now,
        });

        self.store.save_refinancing(refinancing.clone())?;
        Ok(refinancing)
    }

    /// send the draft to the board. the approval document is produced
    /// externally; only its reference is recorded. no ledger mutation.
    pub fn send_to_board(
        &mut self,
        id: RefinancingId,
        document_ref: &str,
        user: &str,
        time: &SafeTimeProvider,
    ) -> Result<Refinancing> {
        let mut refinancing = self.store.get_refinancing(id)?;
        let next = transition(refinancing.status, Action::SendToBoard)?;
        let now = time.now();

        self.emit_status_change(&refinancing, next, now);
        refinancing.status = next;
        refinancing.sent_to_board = true;
        refinancing.board_document_ref = Some(document_ref.to_string());
        refinancing.record_audit(AuditEntry::new(
            AuditAction::SentToBoard,
            user,
            format!("document {}", document_ref),
            now,
        ));

        self.events.emit(Event::RefinancingSentToBoard {
            refinancing_id: id,
            document_ref: document_ref.to_string(),
            timestamp: now,
        });

        self.store.save_refinancing(refinancing.clone())?;
        Ok(refinancing)
    }

    /// record the board's approval. no ledger mutation.
    pub fn approve(
        &mut self,
        id: RefinancingId,
        approver: &str,
        time: &SafeTimeProvider,
    ) -> Result<Refinancing> {
        let mut refinancing = self.store.get_refinancing(id)?;
        let next = transition(refinancing.status, Action::Approve)?;
        let now = time.now();

        self.emit_status_change(&refinancing, next, now);
        refinancing.status = next;
        refinancing.approval = Some(super::ApprovalRecord {
            decided_by: approver.to_string(),
            decided_at: now,
            approved: true,
            reason: None,
        });
        refinancing.record_audit(AuditEntry::new(AuditAction::Approved, approver, "", now));

        self.events.emit(Event::RefinancingApproved {
            refinancing_id: id,
            approved_by: approver.to_string(),
            timestamp: now,
        });

        self.store.save_refinancing(refinancing.clone())?;
        Ok(refinancing)
    }

    /// record the board's rejection; the plan lands in Cancelada.
    pub fn reject(
        &mut self,
        id: RefinancingId,
        approver: &str,
        reason: &str,
        time: &SafeTimeProvider,
    ) -> Result<Refinancing> {
        let mut refinancing = self.store.get_refinancing(id)?;
        let next = transition(refinancing.status, Action::Reject)?;
        let now = time.now();

        self.emit_status_change(&refinancing, next, now);
        refinancing.status = next;
        refinancing.approval = Some(super::ApprovalRecord {
            decided_by: approver.to_string(),
            decided_at: now,
            approved: false,
            reason: Some(reason.to_string()),
        });
        refinancing.record_audit(AuditEntry::new(AuditAction::Rejected, approver, reason, now));

        self.events.emit(Event::RefinancingRejected {
            refinancing_id: id,
            rejected_by: approver.to_string(),
            reason: reason.to_string(),
            timestamp: now,
        });

        self.store.save_refinancing(refinancing.clone())?;
        Ok(refinancing)
    }

    /// abandon a plan that was never executed. no ledger mutation.
    pub fn abandon(
        &mut self,
        id: RefinancingId,
        user: &str,
        reason: &str,
        time: &SafeTimeProvider,
    ) -> Result<Refinancing> {
        let mut refinancing = self.store.get_refinancing(id)?;
        let next = transition(refinancing.status, Action::Abandon)?;
        let now = time.now();

        self.emit_status_change(&refinancing, next, now);
        refinancing.status = next;
        refinancing.record_audit(AuditEntry::new(AuditAction::Abandoned, user, reason, now));

        self.events.emit(Event::RefinancingAbandoned {
            refinancing_id: id,
            reason: reason.to_string(),
            timestamp: now,
        });

        self.store.save_refinancing(refinancing.clone())?;
        Ok(refinancing)
    }

    /// execute the plan against the ledger, all-or-nothing:
    /// originals become Cancelado with a superseding note, one debit per
    /// installment is materialized, and any down payment is applied as a
    /// credit against the earliest installments.
    pub fn execute(
        &mut self,
        id: RefinancingId,
        user: &str,
        time: &SafeTimeProvider,
    ) -> Result<Refinancing> {
        let mut refinancing = self.store.get_refinancing(id)?;
        let next = transition(refinancing.status, Action::Execute)?;
        let now = time.now();
        let today = now.date_naive();

        // consistency: the schedule must account for the principal exactly
        let installments_total: Money = refinancing.schedule.iter().map(|i| i.amount).sum();
        if refinancing.down_payment_amount + installments_total != refinancing.principal {
            return Err(LedgerError::ScheduleSumMismatch {
                down_payment: refinancing.down_payment_amount,
                installments_total,
                principal: refinancing.principal,
            });
        }

        // a schedule fully absorbed by the down payment would materialize
        // empty debits and strand the payment credit; refuse before staging
        if let Some(empty) = refinancing
            .schedule
            .iter()
            .find(|i| !i.amount.is_positive())
        {
            return Err(LedgerError::InvalidAmount {
                amount: empty.amount,
            });
        }

        // stage: supersede each original debit
        let mut staged_originals = Vec::with_capacity(refinancing.original_debit_ids.len());
        for &debit_id in &refinancing.original_debit_ids {
            let mut movement = self.store.get_movement(debit_id)?;
            {
                let (status, _, _) = movement.debit_mut()?;
                *status = DebitStatus::Cancelado;
            }
            append_note(&mut movement.observations, &superseded_note(id));
            movement.refinancing_id = Some(id);
            staged_originals.push(movement);
        }

        // stage: one new debit per installment
        let total = refinancing.schedule.len();
        let mut staged_installments = Vec::with_capacity(total);
        for installment in refinancing.schedule.iter_mut() {
            let debit = Movement::debit(
                refinancing.member_id,
                today,
                installment.amount,
                Origin::Quota,
                format!("Cuota {}/{} refinanciación", installment.number, total),
                Some(installment.due_date),
            )
            .with_refinancing(id);
            installment.movement_id = Some(debit.id);
            staged_installments.push(debit);
        }

        // stage: down payment credit allocated in schedule order
        let mut down_payment_credit = None;
        if refinancing.down_payment_amount.is_positive() {
            let mut credit = Movement::credit(
                refinancing.member_id,
                today,
                refinancing.down_payment_amount,
                Origin::Refinancing,
                "Entrega inicial refinanciación",
            )
            .with_refinancing(id);

            let mut remaining = refinancing.down_payment_amount;
            for (installment, debit) in refinancing
                .schedule
                .iter_mut()
                .zip(staged_installments.iter_mut())
            {
                if remaining.is_zero() {
                    break;
                }
                let portion = remaining.min(installment.amount);
                if portion.is_positive() {
                    allocate(&mut credit, debit, portion)?;
                    installment.paid_amount = portion;
                    installment.status = if portion >= installment.amount {
                        InstallmentStatus::Pagada
                    } else {
                        InstallmentStatus::Parcial
                    };
                    remaining -= portion;
                }
            }
            down_payment_credit = Some(credit);
        }

        self.emit_status_change(&refinancing, next, now);
        refinancing.status = next;
        refinancing.record_audit(AuditEntry::new(
            AuditAction::Executed,
            user,
            format!(
                "{} debits superseded, {} installments materialized, down payment {}",
                staged_originals.len(),
                staged_installments.len(),
                refinancing.down_payment_amount
            ),
            now,
        ));

        // commit
        for movement in staged_originals.iter().cloned() {
            self.store.update_movement(movement)?;
        }
        for movement in staged_installments.iter().cloned() {
            self.store.append_movement(movement)?;
        }
        if let Some(credit) = down_payment_credit {
            self.store.append_movement(credit)?;
        }
        self.store.save_refinancing(refinancing.clone())?;

        self.events.emit(Event::RefinancingExecuted {
            refinancing_id: id,
            member_id: refinancing.member_id,
            debits_superseded: staged_originals.len() as u32,
            installments_created: staged_installments.len() as u32,
            down_payment_applied: refinancing.down_payment_amount,
            timestamp: now,
        });

        Ok(refinancing)
    }

    /// roll back an executed plan, exactly reversing the execution.
    ///
    /// collected credits are stripped from the installment debits, the
    /// installments are deleted, the originals are restored from the
    /// snapshot, and every collected credit is replayed chronologically
    /// against the restored debits. any remainder stays as an unallocated
    /// credit in the member's favor.
    ///
    /// `preserve_interest_fees` is accepted but currently has no effect on
    /// the reallocation.
    pub fn cancel(
        &mut self,
        id: RefinancingId,
        _preserve_interest_fees: bool,
        user: &str,
        time: &SafeTimeProvider,
    ) -> Result<(Refinancing, RollbackSummary)> {
        let mut refinancing = self.store.get_refinancing(id)?;
        let next = transition(refinancing.status, Action::Cancel)?;
        let now = time.now();

        let installment_ids = refinancing.installment_movement_ids();
        let movements = self.store.movements_for_member(refinancing.member_id)?;

        // verify every movement we are about to touch still exists
        for &installment_id in &installment_ids {
            if !movements.iter().any(|m| m.id == installment_id) {
                return Err(LedgerError::MovementNotFound { id: installment_id });
            }
        }
        for snap in &refinancing.original_debits_snapshot {
            if !movements.iter().any(|m| m.id == snap.movement_id) {
                return Err(LedgerError::MovementNotFound {
                    id: snap.movement_id,
                });
            }
        }

        // 1-2. collect the credits applied to this plan's installments and
        // strip only those allocations
        let mut collected: Vec<(Movement, Money, NaiveDate)> = Vec::new();
        for movement in &movements {
            if !movement.is_credit() {
                continue;
            }
            if !movement
                .allocations()
                .iter()
                .any(|a| installment_ids.contains(&a.debit_id))
            {
                continue;
            }
            let mut credit = movement.clone();
            let stripped = strip_allocations(&mut credit, &installment_ids)?;
            let date = credit.date;
            collected.push((credit, stripped, date));
        }
        let collected_total: Money = collected.iter().map(|(_, amount, _)| *amount).sum();

        // 4. restore the originals from the snapshot; the snapshot is the
        // sole source of truth here
        let mut restored = Vec::with_capacity(refinancing.original_debits_snapshot.len());
        for snap in &refinancing.original_debits_snapshot {
            let mut movement = movements
                .iter()
                .find(|m| m.id == snap.movement_id)
                .cloned()
                .ok_or(LedgerError::MovementNotFound {
                    id: snap.movement_id,
                })?;

            movement.amount = snap.amount;
            movement.concept = snap.concept.clone();
            movement.date = snap.date;
            {
                let (status, due_date, paid_amount) = movement.debit_mut()?;
                *due_date = snap.due_date;
                *paid_amount = snap.paid_amount;
                *status = derive_debit_status(snap.amount, snap.paid_amount);
            }
            strip_note(&mut movement.observations, &superseded_note(id));
            movement.refinancing_id = None;
            restored.push(movement);
        }

        // 5. oldest debits and oldest payments first
        restored.sort_by_key(|m| (m.due_date().unwrap_or(m.date), m.date));
        collected.sort_by_key(|(_, _, date)| *date);

        // 6. chronological replay; leftovers stay on the credit
        let mut reassigned = Money::ZERO;
        for (credit, amount, _) in collected.iter_mut() {
            let mut remaining = *amount;
            for debit in restored.iter_mut() {
                if remaining.is_zero() {
                    break;
                }
                let open = debit.amount - debit.paid_amount();
                let portion = remaining.min(open);
                if portion.is_positive() {
                    allocate(credit, debit, portion)?;
                    remaining -= portion;
                    reassigned += portion;
                }
            }
        }
        let leftover = collected_total - reassigned;

        for installment in refinancing.schedule.iter_mut() {
            installment.status = InstallmentStatus::Anulada;
            installment.movement_id = None;
        }

        let earliest_restored_due = restored.iter().filter_map(|m| m.due_date()).min();
        let summary = RollbackSummary {
            refinancing_id: id,
            installments_removed: installment_ids.len() as u32,
            debits_restored: restored.len() as u32,
            credits_reassigned: reassigned,
            leftover_credit: leftover,
            earliest_restored_due,
        };

        self.emit_status_change(&refinancing, next, now);
        refinancing.status = next;
        refinancing.record_audit(AuditEntry::new(
            AuditAction::CancelledWithRollback,
            user,
            format!(
                "{} reassigned across {} restored debits, {} left as credit balance",
                reassigned,
                restored.len(),
                leftover
            ),
            now,
        ));

        // commit: credits first so the installment debits are unreferenced,
        // then the restored originals, then the deletions
        for (credit, _, _) in collected {
            self.store.update_movement(credit)?;
        }
        for movement in restored {
            self.store.update_movement(movement)?;
        }
        for installment_id in installment_ids {
            self.store.remove_movement(installment_id)?;
        }
        self.store.save_refinancing(refinancing.clone())?;

        self.events.emit(Event::RefinancingRolledBack {
            refinancing_id: id,
            member_id: refinancing.member_id,
            credits_reassigned: reassigned,
            leftover_credit: leftover,
            timestamp: now,
        });

        Ok((refinancing, summary))
    }

    /// refresh installment statuses from the live ledger and complete the
    /// plan once every installment is fully paid
    pub fn sync_schedule(
        &mut self,
        id: RefinancingId,
        time: &SafeTimeProvider,
    ) -> Result<Refinancing> {
        let mut refinancing = self.store.get_refinancing(id)?;
        if refinancing.status != RefinancingStatus::Activa {
            return Err(LedgerError::InvalidTransition {
                status: refinancing.status,
                action: "sync",
            });
        }

        let now = time.now();
        let today = now.date_naive();
        let movements = self.store.movements_for_member(refinancing.member_id)?;

        for installment in refinancing.schedule.iter_mut() {
            let Some(movement_id) = installment.movement_id else {
                continue;
            };
            let paid = derived_paid_amount(&movements, movement_id);
            installment.paid_amount = paid;
            installment.status = if paid >= installment.amount {
                InstallmentStatus::Pagada
            } else if paid.is_positive() {
                InstallmentStatus::Parcial
            } else if installment.due_date < today {
                InstallmentStatus::Vencida
            } else {
                InstallmentStatus::Pendiente
            };
        }

        if refinancing
            .schedule
            .iter()
            .all(|i| i.status == InstallmentStatus::Pagada)
        {
            let next = transition(refinancing.status, Action::Complete)?;
            self.emit_status_change(&refinancing, next, now);
            refinancing.status = next;
            refinancing.record_audit(AuditEntry::new(
                AuditAction::Completed,
                "system",
                "all installments paid",
                now,
            ));
            self.events.emit(Event::RefinancingCompleted {
                refinancing_id: id,
                timestamp: now,
            });
        }

        self.store.save_refinancing(refinancing.clone())?;
        Ok(refinancing)
    }

    fn emit_status_change(
        &mut self,
        refinancing: &Refinancing,
        new_status: RefinancingStatus,
        timestamp: chrono::DateTime<chrono::Utc>,
    ) {
        self.events.emit(Event::StatusChanged {
            refinancing_id: refinancing.id,
            old_status: refinancing.status,
            new_status,
            timestamp,
        });
    }
}

fn superseded_note(id: RefinancingId) -> String {
    format!("[refinanciado por plan {}]", id)
}

fn append_note(observations: &mut Option<String>, note: &str) {
    match observations {
        Some(text) => {
            text.push(' ');
            text.push_str(note);
        }
        None => *observations = Some(note.to_string()),
    }
}

fn strip_note(observations: &mut Option<String>, note: &str) {
    if let Some(text) = observations {
        let stripped = text.replace(note, "");
        let trimmed = stripped.trim();
        *observations = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{calculate_balance, outstanding_debt, verify_allocation_invariants};
    use crate::refinancing::calculate;
    use crate::store::InMemoryStore;
    use chrono::{TimeZone, Utc};
    use hourglass_rs::TimeSource;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn test_time() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2025, 1, 20, 12, 0, 0).unwrap(),
        ))
    }

    fn seed_debit(store: &mut InMemoryStore, member: MemberId, amount: i64, due: NaiveDate) -> MovementId {
        let debit = Movement::debit(
            member,
            due.pred_opt().unwrap(),
            Money::from_units(amount),
            Origin::Service,
            "Servicio impago",
            Some(due),
        );
        let id = debit.id;
        store.append_movement(debit).unwrap();
        id
    }

    #[test]
    fn test_transition_table() {
        use RefinancingStatus::*;

        assert_eq!(transition(Draft, Action::Execute).unwrap(), Activa);
        assert_eq!(transition(Aprobada, Action::Execute).unwrap(), Activa);
        assert_eq!(transition(Activa, Action::Cancel).unwrap(), Anulada);
        assert_eq!(transition(Draft, Action::Abandon).unwrap(), Cancelada);

        assert!(transition(Cancelada, Action::Execute).is_err());
        assert!(transition(Activa, Action::Execute).is_err());
        assert!(transition(Draft, Action::Cancel).is_err());
        assert!(transition(Completada, Action::Cancel).is_err());
        assert!(transition(Anulada, Action::Execute).is_err());
    }

    #[test]
    fn test_draft_rejects_foreign_and_non_debit_ids() {
        let member = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut store = InMemoryStore::new();
        let time = test_time();

        let debit_id = seed_debit(&mut store, member, 300_000, date(2025, 1, 10));
        let foreign_id = seed_debit(&mut store, other, 100_000, date(2025, 1, 10));
        let credit = Movement::credit(
            member,
            date(2025, 1, 5),
            Money::from_units(50_000),
            Origin::Payment,
            "pago",
        );
        let credit_id = credit.id;
        store.append_movement(credit).unwrap();

        let terms = calculate(Money::from_units(300_000), 0, 2, date(2025, 2, 1)).unwrap();
        let mut engine = RefinancingEngine::new(&mut store);

        let err = engine
            .create_draft(member, &[foreign_id], &terms, None, "admin", &time)
            .unwrap_err();
        assert!(matches!(err, LedgerError::MovementNotFound { .. }));

        let err = engine
            .create_draft(member, &[credit_id], &terms, None, "admin", &time)
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotADebit { .. }));

        let draft = engine
            .create_draft(member, &[debit_id], &terms, None, "admin", &time)
            .unwrap();
        assert_eq!(draft.status, RefinancingStatus::Draft);
        assert_eq!(draft.audit_trail.len(), 1);
        assert_eq!(draft.original_debits_snapshot.len(), 1);
        assert_eq!(
            draft.original_debits_snapshot[0].amount,
            Money::from_units(300_000)
        );
    }

    #[test]
    fn test_approval_workflow() {
        let member = Uuid::new_v4();
        let mut store = InMemoryStore::new();
        let time = test_time();

        let debit_id = seed_debit(&mut store, member, 300_000, date(2025, 1, 10));
        let terms = calculate(Money::from_units(300_000), 0, 2, date(2025, 2, 1)).unwrap();
        let mut engine = RefinancingEngine::new(&mut store);

        let draft = engine
            .create_draft(member, &[debit_id], &terms, None, "admin", &time)
            .unwrap();
        let sent = engine
            .send_to_board(draft.id, "ACTA-2025-017", "admin", &time)
            .unwrap();
        assert_eq!(sent.status, RefinancingStatus::PendienteAprobacion);
        assert!(sent.sent_to_board);
        assert_eq!(sent.board_document_ref.as_deref(), Some("ACTA-2025-017"));

        let approved = engine.approve(draft.id, "presidente", &time).unwrap();
        assert_eq!(approved.status, RefinancingStatus::Aprobada);
        assert!(approved.approval.as_ref().unwrap().approved);

        // one audit entry per transition
        assert_eq!(approved.audit_trail.len(), 3);

        // the ledger was never touched
        assert_eq!(
            outstanding_debt(&store.movements_for_member(member).unwrap()),
            Money::from_units(300_000)
        );
    }

    #[test]
    fn test_rejection_lands_in_cancelada() {
        let member = Uuid::new_v4();
        let mut store = InMemoryStore::new();
        let time = test_time();

        let debit_id = seed_debit(&mut store, member, 300_000, date(2025, 1, 10));
        let terms = calculate(Money::from_units(300_000), 0, 2, date(2025, 2, 1)).unwrap();
        let mut engine = RefinancingEngine::new(&mut store);

        let draft = engine
            .create_draft(member, &[debit_id], &terms, None, "admin", &time)
            .unwrap();
        engine
            .send_to_board(draft.id, "ACTA-2025-018", "admin", &time)
            .unwrap();
        let rejected = engine
            .reject(draft.id, "presidente", "sin garantías", &time)
            .unwrap();
        assert_eq!(rejected.status, RefinancingStatus::Cancelada);
        assert!(!rejected.approval.as_ref().unwrap().approved);

        // a rejected plan cannot be executed
        let err = engine.execute(draft.id, "admin", &time).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
    }

    #[test]
    fn test_execute_replaces_debits_balance_unchanged() {
        // a 300,000 debit refinanced with 0% down over 2 installments
        let member = Uuid::new_v4();
        let mut store = InMemoryStore::new();
        let time = test_time();

        let debit_id = seed_debit(&mut store, member, 300_000, date(2025, 1, 10));
        let terms = calculate(Money::from_units(300_000), 0, 2, date(2025, 2, 1)).unwrap();
        let mut engine = RefinancingEngine::new(&mut store);

        let draft = engine
            .create_draft(member, &[debit_id], &terms, None, "admin", &time)
            .unwrap();
        let executed = engine.execute(draft.id, "admin", &time).unwrap();
        assert_eq!(executed.status, RefinancingStatus::Activa);

        let movements = store.movements_for_member(member).unwrap();
        verify_allocation_invariants(&movements).unwrap();

        // original superseded, not deleted
        let original = movements.iter().find(|m| m.id == debit_id).unwrap();
        assert_eq!(original.debit_status(), Some(DebitStatus::Cancelado));
        assert_eq!(original.refinancing_id, Some(draft.id));
        assert!(original.observations.as_ref().unwrap().contains("refinanciado"));

        // two new installment debits of 150,000
        let installments: Vec<&Movement> = movements
            .iter()
            .filter(|m| m.refinancing_id == Some(draft.id) && m.is_debit() && m.id != debit_id)
            .collect();
        assert_eq!(installments.len(), 2);
        let mut dues: Vec<NaiveDate> = installments.iter().filter_map(|m| m.due_date()).collect();
        dues.sort();
        assert_eq!(dues, vec![date(2025, 2, 1), date(2025, 3, 1)]);
        for i in &installments {
            assert_eq!(i.amount, Money::from_units(150_000));
            assert_eq!(i.origin, Origin::Quota);
        }

        // outstanding balance unchanged immediately after execute
        assert_eq!(outstanding_debt(&movements), Money::from_units(300_000));
    }

    #[test]
    fn test_execute_applies_down_payment_in_schedule_order() {
        let member = Uuid::new_v4();
        let mut store = InMemoryStore::new();
        let time = test_time();

        let debit_id = seed_debit(&mut store, member, 1_000_000, date(2025, 1, 10));
        let terms = calculate(Money::from_units(1_000_000), 20, 3, date(2025, 2, 15)).unwrap();
        let mut engine = RefinancingEngine::new(&mut store);

        let draft = engine
            .create_draft(member, &[debit_id], &terms, None, "admin", &time)
            .unwrap();
        let executed = engine.execute(draft.id, "admin", &time).unwrap();

        // 200,000 down payment: covers none fully (first installment is
        // 266,667), so the first is Parcial and the rest untouched
        assert_eq!(executed.schedule[0].status, InstallmentStatus::Parcial);
        assert_eq!(executed.schedule[0].paid_amount, Money::from_units(200_000));
        assert_eq!(executed.schedule[1].status, InstallmentStatus::Pendiente);
        assert_eq!(executed.schedule[2].status, InstallmentStatus::Pendiente);

        let movements = store.movements_for_member(member).unwrap();
        verify_allocation_invariants(&movements).unwrap();

        // 800,000 in installments minus the 200,000 down payment received
        assert_eq!(outstanding_debt(&movements), Money::from_units(600_000));
    }

    #[test]
    fn test_execute_down_payment_covers_first_installment() {
        let member = Uuid::new_v4();
        let mut store = InMemoryStore::new();
        let time = test_time();

        let debit_id = seed_debit(&mut store, member, 400_000, date(2025, 1, 10));
        // 50% down = 200,000; installments of 100,000 each
        let terms = calculate(Money::from_units(400_000), 50, 2, date(2025, 2, 1)).unwrap();
        let mut engine = RefinancingEngine::new(&mut store);

        let draft = engine
            .create_draft(member, &[debit_id], &terms, None, "admin", &time)
            .unwrap();
        let executed = engine.execute(draft.id, "admin", &time).unwrap();

        assert_eq!(executed.schedule[0].status, InstallmentStatus::Pagada);
        assert_eq!(executed.schedule[1].status, InstallmentStatus::Pagada);

        // plan completes once synced
        let synced = engine.sync_schedule(draft.id, &time).unwrap();
        assert_eq!(synced.status, RefinancingStatus::Completada);
    }

    #[test]
    fn test_execute_rejects_fully_prepaid_schedule() {
        // 100% down is legal for the calculator but yields zero-amount
        // installments; executing would cancel the originals and leave the
        // whole payment stranded as credit balance, so it must be refused
        let member = Uuid::new_v4();
        let mut store = InMemoryStore::new();
        let time = test_time();

        let debit_id = seed_debit(&mut store, member, 100_000, date(2025, 1, 10));
        let terms = calculate(Money::from_units(100_000), 100, 2, date(2025, 2, 1)).unwrap();
        let mut engine = RefinancingEngine::new(&mut store);

        let draft = engine
            .create_draft(member, &[debit_id], &terms, None, "admin", &time)
            .unwrap();
        let err = engine.execute(draft.id, "admin", &time).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { .. }));

        // nothing was staged or committed
        let movements = store.movements_for_member(member).unwrap();
        assert_eq!(movements.len(), 1);
        let original = &movements[0];
        assert_eq!(original.debit_status(), Some(DebitStatus::Pendiente));
        assert_eq!(original.refinancing_id, None);
        assert_eq!(
            store.get_refinancing(draft.id).unwrap().status,
            RefinancingStatus::Draft
        );
        assert_eq!(outstanding_debt(&movements), Money::from_units(100_000));
    }

    #[test]
    fn test_sync_marks_unpaid_past_due_installments_vencida() {
        // pinned time is 2025-01-20: the first installment is already past
        // due, the second is not
        let member = Uuid::new_v4();
        let mut store = InMemoryStore::new();
        let time = test_time();

        let debit_id = seed_debit(&mut store, member, 300_000, date(2024, 12, 10));
        let terms = calculate(Money::from_units(300_000), 0, 2, date(2025, 1, 1)).unwrap();
        let mut engine = RefinancingEngine::new(&mut store);

        let draft = engine
            .create_draft(member, &[debit_id], &terms, None, "admin", &time)
            .unwrap();
        engine.execute(draft.id, "admin", &time).unwrap();

        let synced = engine.sync_schedule(draft.id, &time).unwrap();
        assert_eq!(synced.status, RefinancingStatus::Activa);
        assert_eq!(synced.schedule[0].due_date, date(2025, 1, 1));
        assert_eq!(synced.schedule[0].status, InstallmentStatus::Vencida);
        assert_eq!(synced.schedule[1].due_date, date(2025, 2, 1));
        assert_eq!(synced.schedule[1].status, InstallmentStatus::Pendiente);

        // paying the overdue installment clears the flag
        let movement_id = synced.schedule[0].movement_id.unwrap();
        let mut installment_debit = store.get_movement(movement_id).unwrap();
        let mut payment = Movement::credit(
            member,
            date(2025, 1, 18),
            Money::from_units(150_000),
            Origin::Payment,
            "Pago cuota atrasada",
        );
        allocate(&mut payment, &mut installment_debit, Money::from_units(150_000)).unwrap();
        store.update_movement(installment_debit).unwrap();
        store.append_movement(payment).unwrap();

        let mut engine = RefinancingEngine::new(&mut store);
        let synced = engine.sync_schedule(draft.id, &time).unwrap();
        assert_eq!(synced.schedule[0].status, InstallmentStatus::Pagada);
    }

    #[test]
    fn test_cancel_rollback_round_trip() {
        // draft -> execute -> cancel must restore the pre-execute ledger
        let member = Uuid::new_v4();
        let mut store = InMemoryStore::new();
        let time = test_time();

        let debit_id = seed_debit(&mut store, member, 300_000, date(2025, 1, 10));
        let before = store.movements_for_member(member).unwrap();
        let balance_before = calculate_balance(&before);

        let terms = calculate(Money::from_units(300_000), 0, 2, date(2025, 2, 1)).unwrap();
        let mut engine = RefinancingEngine::new(&mut store);
        let draft = engine
            .create_draft(member, &[debit_id], &terms, None, "admin", &time)
            .unwrap();
        engine.execute(draft.id, "admin", &time).unwrap();
        let (cancelled, summary) = engine.cancel(draft.id, false, "admin", &time).unwrap();

        assert_eq!(cancelled.status, RefinancingStatus::Anulada);
        assert_eq!(summary.installments_removed, 2);
        assert_eq!(summary.debits_restored, 1);
        assert_eq!(summary.credits_reassigned, Money::ZERO);
        assert_eq!(summary.leftover_credit, Money::ZERO);

        let after = store.movements_for_member(member).unwrap();
        verify_allocation_invariants(&after).unwrap();
        assert_eq!(after.len(), before.len());
        assert_eq!(calculate_balance(&after), balance_before);

        let restored = after.iter().find(|m| m.id == debit_id).unwrap();
        assert_eq!(restored.debit_status(), Some(DebitStatus::Pendiente));
        assert_eq!(restored.amount, Money::from_units(300_000));
        assert_eq!(restored.due_date(), Some(date(2025, 1, 10)));
        assert_eq!(restored.refinancing_id, None);
        assert_eq!(restored.observations, None);
    }

    #[test]
    fn test_cancel_reassigns_collected_credits_chronologically() {
        // example: credit of 150,000 paid against the first installment,
        // then the plan is cancelled; the credit is replayed against the
        // restored original
        let member = Uuid::new_v4();
        let mut store = InMemoryStore::new();
        let time = test_time();

        let debit_id = seed_debit(&mut store, member, 300_000, date(2025, 1, 10));
        let terms = calculate(Money::from_units(300_000), 0, 2, date(2025, 2, 1)).unwrap();
        let mut engine = RefinancingEngine::new(&mut store);
        let draft = engine
            .create_draft(member, &[debit_id], &terms, None, "admin", &time)
            .unwrap();
        let executed = engine.execute(draft.id, "admin", &time).unwrap();

        // member pays the first installment in full
        let first_movement_id = executed.schedule[0].movement_id.unwrap();
        let mut installment_debit = store.get_movement(first_movement_id).unwrap();
        let mut payment = Movement::credit(
            member,
            date(2025, 2, 1),
            Money::from_units(150_000),
            Origin::Payment,
            "Pago cuota 1",
        );
        allocate(&mut payment, &mut installment_debit, Money::from_units(150_000)).unwrap();
        store.update_movement(installment_debit).unwrap();
        store.append_movement(payment.clone()).unwrap();

        let synced = {
            let mut engine = RefinancingEngine::new(&mut store);
            engine.sync_schedule(draft.id, &time).unwrap()
        };
        assert_eq!(synced.schedule[0].status, InstallmentStatus::Pagada);

        let mut engine = RefinancingEngine::new(&mut store);
        let (_, summary) = engine.cancel(draft.id, false, "admin", &time).unwrap();
        assert_eq!(summary.credits_reassigned, Money::from_units(150_000));
        assert_eq!(summary.leftover_credit, Money::ZERO);

        let after = store.movements_for_member(member).unwrap();
        verify_allocation_invariants(&after).unwrap();

        // the original is back, partially paid by chronological replay
        let restored = after.iter().find(|m| m.id == debit_id).unwrap();
        assert_eq!(restored.debit_status(), Some(DebitStatus::Parcial));
        assert_eq!(restored.paid_amount(), Money::from_units(150_000));

        // the installment debits no longer exist
        assert!(store.get_movement(first_movement_id).is_err());

        // the credit now points at the restored original
        let replayed = after.iter().find(|m| m.id == payment.id).unwrap();
        assert_eq!(replayed.allocations().len(), 1);
        assert_eq!(replayed.allocations()[0].debit_id, debit_id);
    }

    #[test]
    fn test_cancel_preserves_leftover_as_credit_balance() {
        // the plan collects more than the restored debit can absorb; the
        // surplus must remain as an unallocated credit
        let member = Uuid::new_v4();
        let mut store = InMemoryStore::new();
        let time = test_time();

        // the original had 40,000 already paid before drafting
        let debit_id = seed_debit(&mut store, member, 100_000, date(2025, 1, 10));
        let mut original = store.get_movement(debit_id).unwrap();
        let mut old_payment = Movement::credit(
            member,
            date(2025, 1, 5),
            Money::from_units(40_000),
            Origin::Payment,
            "Pago parcial previo",
        );
        allocate(&mut old_payment, &mut original, Money::from_units(40_000)).unwrap();
        store.update_movement(original).unwrap();
        store.append_movement(old_payment).unwrap();

        // refinanced for the full face amount over 2 installments
        let terms = calculate(Money::from_units(100_000), 0, 2, date(2025, 2, 1)).unwrap();
        let mut engine = RefinancingEngine::new(&mut store);
        let draft = engine
            .create_draft(member, &[debit_id], &terms, None, "admin", &time)
            .unwrap();
        assert_eq!(
            draft.original_debits_snapshot[0].paid_amount,
            Money::from_units(40_000)
        );
        let executed = engine.execute(draft.id, "admin", &time).unwrap();

        // both installments paid in full: 100,000 collected
        for installment in &executed.schedule {
            let movement_id = installment.movement_id.unwrap();
            let mut debit = store.get_movement(movement_id).unwrap();
            let mut payment = Movement::credit(
                member,
                debit.due_date().unwrap(),
                installment.amount,
                Origin::Payment,
                format!("Pago cuota {}", installment.number),
            );
            allocate(&mut payment, &mut debit, installment.amount).unwrap();
            store.update_movement(debit).unwrap();
            store.append_movement(payment).unwrap();
        }

        let mut engine = RefinancingEngine::new(&mut store);
        let (_, summary) = engine.cancel(draft.id, false, "admin", &time).unwrap();

        // restored debit can only absorb 60,000 of the collected 100,000
        assert_eq!(summary.credits_reassigned, Money::from_units(60_000));
        assert_eq!(summary.leftover_credit, Money::from_units(40_000));

        let after = store.movements_for_member(member).unwrap();
        verify_allocation_invariants(&after).unwrap();

        let restored = after.iter().find(|m| m.id == debit_id).unwrap();
        assert_eq!(restored.debit_status(), Some(DebitStatus::Cancelado));

        // the surplus is preserved, not discarded
        assert_eq!(
            crate::ledger::unallocated_credit(&after),
            Money::from_units(40_000)
        );
    }

    #[test]
    fn test_cancel_requires_activa() {
        let member = Uuid::new_v4();
        let mut store = InMemoryStore::new();
        let time = test_time();

        let debit_id = seed_debit(&mut store, member, 300_000, date(2025, 1, 10));
        let terms = calculate(Money::from_units(300_000), 0, 2, date(2025, 2, 1)).unwrap();
        let mut engine = RefinancingEngine::new(&mut store);
        let draft = engine
            .create_draft(member, &[debit_id], &terms, None, "admin", &time)
            .unwrap();

        let err = engine.cancel(draft.id, false, "admin", &time).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidTransition {
                status: RefinancingStatus::Draft,
                ..
            }
        ));

        // a draft can still be abandoned without touching the ledger
        let abandoned = engine
            .abandon(draft.id, "admin", "socio desistió", &time)
            .unwrap();
        assert_eq!(abandoned.status, RefinancingStatus::Cancelada);
    }

    #[test]
    fn test_audit_trail_grows_by_one_per_transition() {
        let member = Uuid::new_v4();
        let mut store = InMemoryStore::new();
        let time = test_time();

        let debit_id = seed_debit(&mut store, member, 300_000, date(2025, 1, 10));
        let terms = calculate(Money::from_units(300_000), 0, 2, date(2025, 2, 1)).unwrap();
        let mut engine = RefinancingEngine::new(&mut store);

        let draft = engine
            .create_draft(member, &[debit_id], &terms, None, "admin", &time)
            .unwrap();
        engine
            .send_to_board(draft.id, "ACTA-2025-019", "admin", &time)
            .unwrap();
        engine.approve(draft.id, "presidente", &time).unwrap();
        engine.execute(draft.id, "admin", &time).unwrap();
        let (cancelled, _) = engine.cancel(draft.id, false, "admin", &time).unwrap();

        let actions: Vec<AuditAction> = cancelled.audit_trail.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::DraftCreated,
                AuditAction::SentToBoard,
                AuditAction::Approved,
                AuditAction::Executed,
                AuditAction::CancelledWithRollback,
            ]
        );
    }
}
