//! One patient's intake conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::availability::SlotCandidate;
use crate::error::IntakeError;

use super::model::{BookingSelection, PatientRecord};
use super::state::IntakeStage;

/// Explicit per-conversation state, owned by whoever drives the turns.
///
/// Only the state machine mutates a session; everything else reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeSession {
    id: Uuid,
    stage: IntakeStage,
    record: PatientRecord,
    /// Slots most recently shown to the user.
    offered_slots: Vec<SlotCandidate>,
    selection: Option<BookingSelection>,
    turn_count: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Default for IntakeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl IntakeSession {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            stage: IntakeStage::default(),
            record: PatientRecord::default(),
            offered_slots: Vec::new(),
            selection: None,
            turn_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stage(&self) -> IntakeStage {
        self.stage
    }

    pub fn record(&self) -> &PatientRecord {
        &self.record
    }

    pub fn offered_slots(&self) -> &[SlotCandidate] {
        &self.offered_slots
    }

    pub fn selection(&self) -> Option<&BookingSelection> {
        self.selection.as_ref()
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_done(&self) -> bool {
        self.stage.is_terminal()
    }

    pub(crate) fn record_mut(&mut self) -> &mut PatientRecord {
        &mut self.record
    }

    pub(crate) fn set_offered_slots(&mut self, slots: Vec<SlotCandidate>) {
        self.offered_slots = slots;
    }

    pub(crate) fn select(&mut self, slot: SlotCandidate) {
        self.selection = Some(BookingSelection::new(slot));
    }

    /// Count a turn and bump the activity timestamp.
    pub(crate) fn touch(&mut self) {
        self.turn_count += 1;
        self.updated_at = Utc::now();
    }

    /// Move to `target` if the stage graph allows it.
    pub(crate) fn transition_to(&mut self, target: IntakeStage) -> Result<IntakeStage, IntakeError> {
        if !self.stage.can_transition_to(target) {
            return Err(IntakeError::InvalidTransition {
                id: self.id,
                from: self.stage,
                to: target,
            });
        }
        self.stage = target;
        Ok(target)
    }

    /// Advance to the next stage in sequence.
    pub(crate) fn advance(&mut self) -> Result<IntakeStage, IntakeError> {
        let next = self
            .stage
            .next()
            .ok_or(IntakeError::SessionComplete { id: self.id })?;
        self.transition_to(next)
    }

    /// Take the Confirm → SelectSlot edge, dropping the rejected selection.
    pub(crate) fn reopen_slot_selection(&mut self) -> Result<IntakeStage, IntakeError> {
        let stage = self.transition_to(IntakeStage::SelectSlot)?;
        self.selection = None;
        Ok(stage)
    }
}
