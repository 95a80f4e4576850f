//! The intake state machine: one utterance in, one prompt out.
//!
//! `handle_turn` routes the utterance to the current stage, asks the
//! extractor for a candidate, validates it, and either advances the session
//! or re-prompts without advancing. It performs no I/O.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::availability::{AvailabilityModel, SlotCandidate};
use crate::config::IntakeConfig;
use crate::error::IntakeError;

use super::extractor::{FieldExtractor, RuleExtractor, SlotReference};
use super::model::{IntakeField, PatientRecord};
use super::prompts;
use super::session::IntakeSession;
use super::state::IntakeStage;
use super::validators::{self, ValidationError};

/// Why a turn did not advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeIssue {
    /// Nothing usable was found in the utterance.
    ExtractionMiss,
    /// A candidate was found but failed its validator.
    Invalid(ValidationError),
    /// The slot reference was out of range, unmatched, or ambiguous.
    InvalidSelection { reason: String },
    /// The doctor/location pair has no bookable slots.
    NoAvailability {
        doctor: String,
        location: Option<String>,
    },
    /// The chosen slot was booked by another conversation first.
    SlotTaken { slot: SlotCandidate },
}

/// What a turn did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    Advanced { from: IntakeStage, to: IntakeStage },
    /// The Confirm → SelectSlot edge, taken on a "no" or when the slot
    /// was booked elsewhere in the meantime.
    Regressed { from: IntakeStage, to: IntakeStage },
    Reprompted(IntakeIssue),
}

/// Result of one `handle_turn` call.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Stage after the turn.
    pub stage: IntakeStage,
    /// Next message for the patient.
    pub prompt: String,
    pub event: TurnEvent,
}

impl TurnOutcome {
    /// Whether this turn moved the session to `Done`.
    pub fn is_complete(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn issue(&self) -> Option<&IntakeIssue> {
        match &self.event {
            TurnEvent::Reprompted(issue) => Some(issue),
            _ => None,
        }
    }
}

/// Drives intake sessions. Stateless between calls; all conversation state
/// lives in the `IntakeSession` passed in.
pub struct IntakeMachine {
    config: IntakeConfig,
    availability: AvailabilityModel,
    extractor: Arc<dyn FieldExtractor>,
    today: Option<NaiveDate>,
}

impl IntakeMachine {
    pub fn new(config: IntakeConfig) -> Self {
        let availability = AvailabilityModel::new(config.slots.clone());
        Self {
            config,
            availability,
            extractor: Arc::new(RuleExtractor::new()),
            today: None,
        }
    }

    /// Swap in a different extraction strategy.
    pub fn with_extractor(mut self, extractor: Arc<dyn FieldExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Pin "today" for date-of-birth validation.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    pub fn availability(&self) -> &AvailabilityModel {
        &self.availability
    }

    fn today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// Greeting plus the question for the session's current stage.
    pub fn opening_prompt(&self, session: &IntakeSession) -> String {
        format!("{}\n\n{}", prompts::greeting(), self.current_prompt(session))
    }

    /// The question for the session's current stage, without mutating it.
    pub fn current_prompt(&self, session: &IntakeSession) -> String {
        match session.stage() {
            IntakeStage::SelectSlot => prompts::slot_list(session.offered_slots()),
            IntakeStage::Confirm | IntakeStage::Done => match session.selection() {
                Some(sel) if session.is_done() => prompts::booked(&sel.slot),
                Some(sel) => prompts::confirm_prompt(session.record(), &sel.slot),
                None => prompts::slot_list(session.offered_slots()),
            },
            stage => match stage.field() {
                Some(field) => prompts::field_prompt(field, &self.config),
                None => String::new(),
            },
        }
    }

    /// Consume one user utterance.
    ///
    /// Returns `Err` only for caller mistakes: a blank utterance or a session
    /// that is already `Done`. Everything the patient can get wrong comes
    /// back as a re-prompt in the `TurnOutcome`.
    pub fn handle_turn(
        &self,
        session: &mut IntakeSession,
        utterance: &str,
    ) -> Result<TurnOutcome, IntakeError> {
        if session.is_done() {
            return Err(IntakeError::SessionComplete { id: session.id() });
        }
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Err(IntakeError::EmptyUtterance);
        }

        session.touch();
        let stage = session.stage();
        match stage {
            IntakeStage::SelectSlot => self.select_slot(session, utterance),
            IntakeStage::Confirm => self.confirm(session, utterance),
            _ => match stage.field() {
                Some(field) => self.collect_field(session, field, utterance),
                None => Err(IntakeError::SessionComplete { id: session.id() }),
            },
        }
    }

    fn collect_field(
        &self,
        session: &mut IntakeSession,
        field: IntakeField,
        utterance: &str,
    ) -> Result<TurnOutcome, IntakeError> {
        let candidate = self
            .catalog_match(field, utterance)
            .or_else(|| self.extractor.extract_field(field, utterance));
        let Some(candidate) = candidate else {
            debug!(session_id = %session.id(), %field, "No candidate in utterance");
            return Ok(self.reprompt(session, IntakeIssue::ExtractionMiss));
        };

        session.record_mut().propose(field, &candidate);
        match self.check_field(session.record(), field, &candidate) {
            Ok(normalized) => {
                session.record_mut().confirm(field, normalized);
                let from = session.stage();
                let to = session.advance()?;
                info!(session_id = %session.id(), %from, %to, "Intake field confirmed");
                let prompt = self.enter_stage(session);
                Ok(TurnOutcome {
                    stage: to,
                    prompt,
                    event: TurnEvent::Advanced { from, to },
                })
            }
            Err(issue) => {
                session.record_mut().reject(field);
                warn!(session_id = %session.id(), %field, issue = ?issue, "Intake field rejected");
                Ok(self.reprompt(session, issue))
            }
        }
    }

    /// A reply that names a catalog entry outright, before any lead-in
    /// stripping by the extractor.
    fn catalog_match(&self, field: IntakeField, utterance: &str) -> Option<String> {
        let known = match field {
            IntakeField::Doctor => &self.config.doctors,
            IntakeField::Location => &self.config.locations,
            _ => return None,
        };
        validators::validate_catalog_entry(field, utterance, known, false).ok()
    }

    /// Validate and normalize a field candidate against the current record.
    fn check_field(
        &self,
        record: &PatientRecord,
        field: IntakeField,
        candidate: &str,
    ) -> Result<String, IntakeIssue> {
        let open_ended = self.config.open_ended_doctor_location;
        match field {
            IntakeField::Name => validators::validate_name(candidate).map_err(IntakeIssue::Invalid),
            IntakeField::DateOfBirth => validators::validate_date_of_birth(candidate, self.today())
                .map(|dob| dob.format("%Y-%m-%d").to_string())
                .map_err(IntakeIssue::Invalid),
            IntakeField::Doctor => {
                let doctor = validators::validate_catalog_entry(
                    field,
                    candidate,
                    &self.config.doctors,
                    open_ended,
                )
                .map_err(IntakeIssue::Invalid)?;
                // Free-text locations may still have capacity, so only a
                // closed catalog can rule the doctor out here.
                if !open_ended
                    && self
                        .availability
                        .locations_with_capacity(&doctor, &self.config.locations)
                        .is_empty()
                {
                    return Err(IntakeIssue::NoAvailability {
                        doctor,
                        location: None,
                    });
                }
                Ok(doctor)
            }
            IntakeField::Location => {
                let location = validators::validate_catalog_entry(
                    field,
                    candidate,
                    &self.config.locations,
                    open_ended,
                )
                .map_err(IntakeIssue::Invalid)?;
                let doctor = record.confirmed(IntakeField::Doctor).unwrap_or_default();
                if !self.availability.has_capacity(doctor, &location) {
                    return Err(IntakeIssue::NoAvailability {
                        doctor: doctor.to_string(),
                        location: Some(location),
                    });
                }
                Ok(location)
            }
            IntakeField::InsuranceProvider => {
                validators::validate_insurance_provider(candidate).map_err(IntakeIssue::Invalid)
            }
            IntakeField::InsuranceId => {
                validators::validate_insurance_id(candidate, self.config.insurance_id_min_length)
                    .map_err(IntakeIssue::Invalid)
            }
        }
    }

    /// Slots for the record's confirmed doctor and location.
    fn slots_for(&self, record: &PatientRecord) -> Vec<SlotCandidate> {
        let doctor = record.confirmed(IntakeField::Doctor).unwrap_or_default();
        let location = record.confirmed(IntakeField::Location).unwrap_or_default();
        self.availability.list_slots(doctor, location)
    }

    fn offer_slots(&self, session: &mut IntakeSession) -> Vec<SlotCandidate> {
        let slots = self.slots_for(session.record());
        session.set_offered_slots(slots.clone());
        slots
    }

    fn no_availability(&self, record: &PatientRecord) -> IntakeIssue {
        IntakeIssue::NoAvailability {
            doctor: record.confirmed(IntakeField::Doctor).unwrap_or_default().to_string(),
            location: record.confirmed(IntakeField::Location).map(str::to_string),
        }
    }

    /// Prompt for a stage that was just entered.
    fn enter_stage(&self, session: &mut IntakeSession) -> String {
        match session.stage() {
            IntakeStage::SelectSlot => {
                let slots = self.offer_slots(session);
                if slots.is_empty() {
                    let issue = self.no_availability(session.record());
                    self.issue_prompt(session, &issue)
                } else {
                    prompts::slot_list(&slots)
                }
            }
            _ => self.current_prompt(session),
        }
    }

    fn select_slot(
        &self,
        session: &mut IntakeSession,
        utterance: &str,
    ) -> Result<TurnOutcome, IntakeError> {
        // Numbers refer to the list the patient was shown.
        let mut slots = session.offered_slots().to_vec();
        if slots.is_empty() {
            slots = self.offer_slots(session);
        }
        if slots.is_empty() {
            let issue = self.no_availability(session.record());
            return Ok(self.reprompt(session, issue));
        }

        let Some(reference) = self.extractor.extract_slot(utterance) else {
            debug!(session_id = %session.id(), "No slot reference in utterance");
            return Ok(self.reprompt(session, IntakeIssue::ExtractionMiss));
        };

        match resolve_slot(&slots, reference) {
            Ok(slot) if self.availability.is_reserved(&slot) => {
                warn!(session_id = %session.id(), start = %slot.start_time, "Selected slot already booked");
                self.offer_slots(session);
                Ok(self.reprompt(session, IntakeIssue::SlotTaken { slot }))
            }
            Ok(slot) => {
                info!(session_id = %session.id(), start = %slot.start_time, "Slot selected");
                session.select(slot);
                let from = session.stage();
                let to = session.advance()?;
                Ok(TurnOutcome {
                    stage: to,
                    prompt: self.current_prompt(session),
                    event: TurnEvent::Advanced { from, to },
                })
            }
            Err(reason) => Ok(self.reprompt(session, IntakeIssue::InvalidSelection { reason })),
        }
    }

    fn confirm(
        &self,
        session: &mut IntakeSession,
        utterance: &str,
    ) -> Result<TurnOutcome, IntakeError> {
        let Some(accepted) = self.extractor.extract_answer(utterance) else {
            return Ok(self.reprompt(session, IntakeIssue::ExtractionMiss));
        };

        let from = session.stage();
        if accepted {
            if let Some(slot) = session.selection().map(|sel| sel.slot.clone()) {
                if !self.availability.reserve(&slot) {
                    return self.slot_taken(session, slot);
                }
            }
            let to = session.advance()?;
            info!(session_id = %session.id(), "Booking confirmed");
            Ok(TurnOutcome {
                stage: to,
                prompt: self.current_prompt(session),
                event: TurnEvent::Advanced { from, to },
            })
        } else {
            let to = session.reopen_slot_selection()?;
            info!(session_id = %session.id(), "Slot declined, reopening selection");
            let slots = self.offer_slots(session);
            Ok(TurnOutcome {
                stage: to,
                prompt: prompts::slot_declined(&slots),
                event: TurnEvent::Regressed { from, to },
            })
        }
    }

    /// Another conversation booked the slot between selection and "yes".
    fn slot_taken(
        &self,
        session: &mut IntakeSession,
        slot: SlotCandidate,
    ) -> Result<TurnOutcome, IntakeError> {
        let from = session.stage();
        let to = session.reopen_slot_selection()?;
        warn!(session_id = %session.id(), start = %slot.start_time, "Slot booked elsewhere before confirmation");
        self.offer_slots(session);
        Ok(TurnOutcome {
            stage: to,
            prompt: self.issue_prompt(session, &IntakeIssue::SlotTaken { slot }),
            event: TurnEvent::Regressed { from, to },
        })
    }

    fn issue_prompt(&self, session: &IntakeSession, issue: &IntakeIssue) -> String {
        let stage = session.stage();
        match issue {
            IntakeIssue::ExtractionMiss => match (stage, session.selection()) {
                (IntakeStage::SelectSlot, _) => format!(
                    "Sorry, I didn't catch which slot you'd like.\n\n{}",
                    prompts::slot_list(session.offered_slots())
                ),
                (IntakeStage::Confirm, Some(sel)) => prompts::confirm_reprompt(&sel.slot),
                _ => prompts::extraction_miss(stage, &self.config),
            },
            IntakeIssue::Invalid(err) => prompts::rejected(&err.reason, err.field, &self.config),
            IntakeIssue::InvalidSelection { reason } => {
                prompts::invalid_selection(reason, session.offered_slots())
            }
            IntakeIssue::NoAvailability { doctor, location } => {
                let alternatives = match location {
                    Some(current) => self
                        .availability
                        .locations_with_capacity(doctor, &self.config.locations)
                        .into_iter()
                        .filter(|l| *l != current.as_str())
                        .collect(),
                    None => Vec::new(),
                };
                prompts::no_availability(doctor, location.as_deref(), &alternatives)
            }
            IntakeIssue::SlotTaken { slot } => {
                let rest = match session.offered_slots() {
                    [] => self.issue_prompt(session, &self.no_availability(session.record())),
                    slots => prompts::slot_list(slots),
                };
                format!("{}\n\n{rest}", prompts::slot_taken(slot))
            }
        }
    }

    fn reprompt(&self, session: &IntakeSession, issue: IntakeIssue) -> TurnOutcome {
        TurnOutcome {
            stage: session.stage(),
            prompt: self.issue_prompt(session, &issue),
            event: TurnEvent::Reprompted(issue),
        }
    }
}

/// Resolve a slot reference against the offered list.
pub fn resolve_slot(
    slots: &[SlotCandidate],
    reference: SlotReference,
) -> Result<SlotCandidate, String> {
    match reference {
        SlotReference::Index(n) => {
            if n == 0 || n > slots.len() {
                return Err(format!(
                    "Slot number must be between 1 and {}",
                    slots.len()
                ));
            }
            Ok(slots[n - 1].clone())
        }
        SlotReference::Time { date, time } => {
            let matches: Vec<&SlotCandidate> = slots
                .iter()
                .filter(|s| s.start_time.time() == time)
                .filter(|s| date.is_none_or(|d| s.start_time.date() == d))
                .collect();
            match matches.as_slice() {
                [only] => Ok((*only).clone()),
                [] => Err(format!("No offered slot starts at {}", time.format("%H:%M"))),
                _ => Err(format!(
                    "More than one offered slot starts at {}; reply with the slot number or include the date",
                    time.format("%H:%M")
                )),
            }
        }
    }
}
