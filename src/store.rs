use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::{LedgerError, Result};
use crate::movement::Movement;
use crate::refinancing::Refinancing;
use crate::types::{MemberId, MovementId, RefinancingId};

/// repository seam over the movement/refinancing persistence.
/// the engine only talks to this trait, so the core logic is testable
/// against the in-memory fake.
pub trait LedgerStore {
    fn movements_for_member(&self, member_id: MemberId) -> Result<Vec<Movement>>;
    fn get_movement(&self, id: MovementId) -> Result<Movement>;
    fn append_movement(&mut self, movement: Movement) -> Result<()>;
    fn update_movement(&mut self, movement: Movement) -> Result<()>;
    fn remove_movement(&mut self, id: MovementId) -> Result<()>;
    fn get_refinancing(&self, id: RefinancingId) -> Result<Refinancing>;
    fn save_refinancing(&mut self, refinancing: Refinancing) -> Result<()>;
}

/// member record as consumed from the member directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub id: MemberId,
    pub name: String,
    /// membership subcategory, drives quota exemption
    pub subcategory: String,
    pub join_date: NaiveDate,
}

/// external member directory, consumed but not implemented here
pub trait MemberDirectory {
    fn get_member(&self, id: MemberId) -> Result<MemberProfile>;
}

/// in-memory store, the default backing for tests and embedding
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InMemoryStore {
    movements: HashMap<MovementId, Movement>,
    refinancings: HashMap<RefinancingId, Refinancing>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// serialize the whole store as json
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// restore a store from json
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// all movements, unordered
    pub fn all_movements(&self) -> impl Iterator<Item = &Movement> {
        self.movements.values()
    }

    fn is_referenced(&self, debit_id: MovementId) -> bool {
        self.movements
            .values()
            .any(|m| m.allocations().iter().any(|a| a.debit_id == debit_id))
    }
}

impl LedgerStore for InMemoryStore {
    fn movements_for_member(&self, member_id: MemberId) -> Result<Vec<Movement>> {
        let mut movements: Vec<Movement> = self
            .movements
            .values()
            .filter(|m| m.member_id == member_id)
            .cloned()
            .collect();
        movements.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        Ok(movements)
    }

    fn get_movement(&self, id: MovementId) -> Result<Movement> {
        self.movements
            .get(&id)
            .cloned()
            .ok_or(LedgerError::MovementNotFound { id })
    }

    fn append_movement(&mut self, movement: Movement) -> Result<()> {
        self.movements.insert(movement.id, movement);
        Ok(())
    }

    fn update_movement(&mut self, movement: Movement) -> Result<()> {
        if !self.movements.contains_key(&movement.id) {
            return Err(LedgerError::MovementNotFound { id: movement.id });
        }
        self.movements.insert(movement.id, movement);
        Ok(())
    }

    fn remove_movement(&mut self, id: MovementId) -> Result<()> {
        let movement = self
            .movements
            .get(&id)
            .ok_or(LedgerError::MovementNotFound { id })?;

        // a debit referenced by allocations is part of history; refuse
        if movement.is_debit() && self.is_referenced(id) {
            return Err(LedgerError::DebitReferenced { id });
        }

        self.movements.remove(&id);
        Ok(())
    }

    fn get_refinancing(&self, id: RefinancingId) -> Result<Refinancing> {
        self.refinancings
            .get(&id)
            .cloned()
            .ok_or(LedgerError::RefinancingNotFound { id })
    }

    fn save_refinancing(&mut self, refinancing: Refinancing) -> Result<()> {
        self.refinancings.insert(refinancing.id, refinancing);
        Ok(())
    }
}

/// in-memory member directory fake
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InMemoryMembers {
    members: HashMap<MemberId, MemberProfile>,
}

impl InMemoryMembers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, member: MemberProfile) {
        self.members.insert(member.id, member);
    }
}

impl MemberDirectory for InMemoryMembers {
    fn get_member(&self, id: MemberId) -> Result<MemberProfile> {
        self.members
            .get(&id)
            .cloned()
            .ok_or(LedgerError::MemberNotFound { id })
    }
}
