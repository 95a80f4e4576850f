//! Patient record and booking data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::availability::SlotCandidate;

/// One of the six patient fields collected during intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeField {
    Name,
    DateOfBirth,
    Doctor,
    Location,
    InsuranceProvider,
    InsuranceId,
}

impl IntakeField {
    /// All fields, in collection order.
    pub const ALL: [IntakeField; 6] = [
        Self::Name,
        Self::DateOfBirth,
        Self::Doctor,
        Self::Location,
        Self::InsuranceProvider,
        Self::InsuranceId,
    ];

    /// Human-readable label used in prompts and rendered artifacts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Name => "Full name",
            Self::DateOfBirth => "Date of birth",
            Self::Doctor => "Doctor",
            Self::Location => "Location",
            Self::InsuranceProvider => "Insurance provider",
            Self::InsuranceId => "Insurance ID",
        }
    }
}

impl std::fmt::Display for IntakeField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Name => "name",
            Self::DateOfBirth => "date_of_birth",
            Self::Doctor => "doctor",
            Self::Location => "location",
            Self::InsuranceProvider => "insurance_provider",
            Self::InsuranceId => "insurance_id",
        };
        write!(f, "{s}")
    }
}

/// Collection state of a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum FieldState {
    #[default]
    Unset,
    /// A candidate was extracted and is awaiting validation.
    PendingConfirmation(String),
    /// The validator accepted the value; holds the normalized form.
    Confirmed(String),
}

impl FieldState {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }

    /// The confirmed value, if any.
    pub fn confirmed(&self) -> Option<&str> {
        match self {
            Self::Confirmed(v) => Some(v),
            _ => None,
        }
    }
}

/// The six patient fields and their collection state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub name: FieldState,
    pub date_of_birth: FieldState,
    pub doctor: FieldState,
    pub location: FieldState,
    pub insurance_provider: FieldState,
    pub insurance_id: FieldState,
}

impl PatientRecord {
    pub fn get(&self, field: IntakeField) -> &FieldState {
        match field {
            IntakeField::Name => &self.name,
            IntakeField::DateOfBirth => &self.date_of_birth,
            IntakeField::Doctor => &self.doctor,
            IntakeField::Location => &self.location,
            IntakeField::InsuranceProvider => &self.insurance_provider,
            IntakeField::InsuranceId => &self.insurance_id,
        }
    }

    fn get_mut(&mut self, field: IntakeField) -> &mut FieldState {
        match field {
            IntakeField::Name => &mut self.name,
            IntakeField::DateOfBirth => &mut self.date_of_birth,
            IntakeField::Doctor => &mut self.doctor,
            IntakeField::Location => &mut self.location,
            IntakeField::InsuranceProvider => &mut self.insurance_provider,
            IntakeField::InsuranceId => &mut self.insurance_id,
        }
    }

    /// Record an extracted candidate. Confirmed fields are never overwritten.
    pub fn propose(&mut self, field: IntakeField, raw: &str) {
        let state = self.get_mut(field);
        if !state.is_confirmed() {
            *state = FieldState::PendingConfirmation(raw.to_string());
        }
    }

    /// Mark a field confirmed with its normalized value.
    pub fn confirm(&mut self, field: IntakeField, normalized: String) {
        let state = self.get_mut(field);
        if !state.is_confirmed() {
            *state = FieldState::Confirmed(normalized);
        }
    }

    /// Drop a rejected candidate. Confirmed fields are left untouched.
    pub fn reject(&mut self, field: IntakeField) {
        let state = self.get_mut(field);
        if !state.is_confirmed() {
            *state = FieldState::Unset;
        }
    }

    /// The confirmed value of `field`, if any.
    pub fn confirmed(&self, field: IntakeField) -> Option<&str> {
        self.get(field).confirmed()
    }

    pub fn confirmed_count(&self) -> usize {
        IntakeField::ALL
            .iter()
            .filter(|f| self.get(**f).is_confirmed())
            .count()
    }

    /// True once all six fields are confirmed.
    pub fn is_intake_complete(&self) -> bool {
        self.confirmed_count() == IntakeField::ALL.len()
    }
}

/// The slot the user picked, with the time it was picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingSelection {
    pub slot: SlotCandidate,
    pub selected_at: DateTime<Utc>,
}

impl BookingSelection {
    pub fn new(slot: SlotCandidate) -> Self {
        Self {
            slot,
            selected_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_record_is_empty() {
        let record = PatientRecord::default();
        assert_eq!(record.confirmed_count(), 0);
        assert!(!record.is_intake_complete());
        for field in IntakeField::ALL {
            assert_eq!(record.get(field), &FieldState::Unset);
        }
    }

    #[test]
    fn propose_then_confirm() {
        let mut record = PatientRecord::default();
        record.propose(IntakeField::Name, "  jane   doe ");
        assert_eq!(
            record.name,
            FieldState::PendingConfirmation("  jane   doe ".into())
        );
        record.confirm(IntakeField::Name, "jane doe".into());
        assert_eq!(record.confirmed(IntakeField::Name), Some("jane doe"));
        assert_eq!(record.confirmed_count(), 1);
    }

    #[test]
    fn reject_clears_pending_only() {
        let mut record = PatientRecord::default();
        record.propose(IntakeField::InsuranceId, "x");
        record.reject(IntakeField::InsuranceId);
        assert_eq!(record.insurance_id, FieldState::Unset);

        record.confirm(IntakeField::Doctor, "Dr. Smith".into());
        record.propose(IntakeField::Doctor, "Dr. Who");
        record.reject(IntakeField::Doctor);
        assert_eq!(record.confirmed(IntakeField::Doctor), Some("Dr. Smith"));
    }

    #[test]
    fn confirmed_fields_are_not_overwritten() {
        let mut record = PatientRecord::default();
        record.confirm(IntakeField::Location, "Downtown Clinic".into());
        record.confirm(IntakeField::Location, "Uptown".into());
        assert_eq!(record.confirmed(IntakeField::Location), Some("Downtown Clinic"));
    }

    #[test]
    fn complete_when_all_confirmed() {
        let mut record = PatientRecord::default();
        for field in IntakeField::ALL {
            record.confirm(field, format!("{field}-value"));
        }
        assert!(record.is_intake_complete());
    }

    #[test]
    fn field_state_serde_shape() {
        let json = serde_json::to_value(FieldState::Confirmed("AH12345".into())).unwrap();
        assert_eq!(json["state"], "confirmed");
        assert_eq!(json["value"], "AH12345");

        let unset = serde_json::to_value(FieldState::Unset).unwrap();
        assert_eq!(unset["state"], "unset");
    }
}
