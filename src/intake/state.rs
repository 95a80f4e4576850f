//! Intake stages: which piece of information the conversation is collecting.

use serde::{Deserialize, Serialize};

use super::model::IntakeField;

/// The stages of the intake conversation.
///
/// Progresses linearly: CollectName → CollectDob → CollectDoctor →
/// CollectLocation → CollectInsuranceProvider → CollectInsuranceId →
/// SelectSlot → Confirm → Done. The only backward edge is
/// Confirm → SelectSlot, taken when the user rejects the proposed slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeStage {
    CollectName,
    CollectDob,
    CollectDoctor,
    CollectLocation,
    CollectInsuranceProvider,
    CollectInsuranceId,
    SelectSlot,
    Confirm,
    Done,
}

impl IntakeStage {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: IntakeStage) -> bool {
        use IntakeStage::*;
        matches!(
            (self, target),
            (CollectName, CollectDob)
                | (CollectDob, CollectDoctor)
                | (CollectDoctor, CollectLocation)
                | (CollectLocation, CollectInsuranceProvider)
                | (CollectInsuranceProvider, CollectInsuranceId)
                | (CollectInsuranceId, SelectSlot)
                | (SelectSlot, Confirm)
                | (Confirm, Done)
                | (Confirm, SelectSlot)
        )
    }

    /// Whether this stage is terminal (intake is done).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Get the next stage in the forward progression, if any.
    pub fn next(&self) -> Option<IntakeStage> {
        use IntakeStage::*;
        match self {
            CollectName => Some(CollectDob),
            CollectDob => Some(CollectDoctor),
            CollectDoctor => Some(CollectLocation),
            CollectLocation => Some(CollectInsuranceProvider),
            CollectInsuranceProvider => Some(CollectInsuranceId),
            CollectInsuranceId => Some(SelectSlot),
            SelectSlot => Some(Confirm),
            Confirm => Some(Done),
            Done => None,
        }
    }

    /// The patient field this stage collects, if it is a field stage.
    pub fn field(&self) -> Option<IntakeField> {
        use IntakeStage::*;
        match self {
            CollectName => Some(IntakeField::Name),
            CollectDob => Some(IntakeField::DateOfBirth),
            CollectDoctor => Some(IntakeField::Doctor),
            CollectLocation => Some(IntakeField::Location),
            CollectInsuranceProvider => Some(IntakeField::InsuranceProvider),
            CollectInsuranceId => Some(IntakeField::InsuranceId),
            SelectSlot | Confirm | Done => None,
        }
    }
}

impl Default for IntakeStage {
    fn default() -> Self {
        Self::CollectName
    }
}

impl std::fmt::Display for IntakeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CollectName => "collect_name",
            Self::CollectDob => "collect_dob",
            Self::CollectDoctor => "collect_doctor",
            Self::CollectLocation => "collect_location",
            Self::CollectInsuranceProvider => "collect_insurance_provider",
            Self::CollectInsuranceId => "collect_insurance_id",
            Self::SelectSlot => "select_slot",
            Self::Confirm => "confirm",
            Self::Done => "done",
        };
        write!(f, "{s}")
    }
}
