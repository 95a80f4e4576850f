//! Prompt text shown to the patient at each stage.

use crate::availability::SlotCandidate;
use crate::config::IntakeConfig;

use super::model::{IntakeField, PatientRecord};
use super::state::IntakeStage;

/// First message of a new conversation.
pub fn greeting() -> String {
    "Hello! I'm the clinic scheduling assistant. I'll collect a few details and then \
     help you book an appointment. Type `restart` at any time to start over."
        .to_string()
}

/// The question asked at a field stage.
pub fn field_prompt(field: IntakeField, config: &IntakeConfig) -> String {
    match field {
        IntakeField::Name => "May I have your **full name**?".to_string(),
        IntakeField::DateOfBirth => {
            "What is your **date of birth**? (YYYY-MM-DD, e.g. 1990-04-02)".to_string()
        }
        IntakeField::Doctor => with_options(
            "Which **doctor** would you like to see?",
            &config.doctors,
            config.open_ended_doctor_location,
        ),
        IntakeField::Location => with_options(
            "Which **location** suits you best?",
            &config.locations,
            config.open_ended_doctor_location,
        ),
        IntakeField::InsuranceProvider => {
            "Who is your **insurance provider**?".to_string()
        }
        IntakeField::InsuranceId => "What is your **insurance member ID**?".to_string(),
    }
}

fn with_options(question: &str, options: &[String], open_ended: bool) -> String {
    if options.is_empty() {
        return question.to_string();
    }
    if open_ended {
        format!("{question} (e.g. {})", options.join(", "))
    } else {
        format!("{question} Options: {}", options.join(", "))
    }
}

/// Numbered slot list with the selection instruction.
pub fn slot_list(slots: &[SlotCandidate]) -> String {
    let options: Vec<String> = slots
        .iter()
        .enumerate()
        .map(|(i, s)| format!("- **{}**. {}", i + 1, s.label()))
        .collect();
    format!(
        "### Available slots\n{}\n\nReply with the **number** of your preferred slot, or its start time.",
        options.join("\n")
    )
}

/// Ask the patient to confirm the chosen slot.
pub fn confirm_prompt(record: &PatientRecord, slot: &SlotCandidate) -> String {
    let name = record.confirmed(IntakeField::Name).unwrap_or("there");
    format!(
        "Thanks, {name}. Shall I book **{}**? Please answer **yes** or **no**.",
        slot.label()
    )
}

/// Re-ask at the confirmation stage when the answer was unclear.
pub fn confirm_reprompt(slot: &SlotCandidate) -> String {
    format!(
        "Sorry, I need a clear **yes** or **no**: should I book {}?",
        slot.label()
    )
}

/// Shown when the patient accepts the slot.
pub fn booked(slot: &SlotCandidate) -> String {
    format!("**Booked!** {}.", slot.label())
}

/// Shown when the patient rejects the proposed slot.
pub fn slot_declined(slots: &[SlotCandidate]) -> String {
    format!("No problem, let's pick another time.\n\n{}", slot_list(slots))
}

/// Lead-in when another patient booked the slot first.
pub fn slot_taken(slot: &SlotCandidate) -> String {
    format!("Sorry, {} was just booked by another patient.", slot.label())
}

/// Re-prompt after nothing usable was found in the reply.
pub fn extraction_miss(stage: IntakeStage, config: &IntakeConfig) -> String {
    match stage.field() {
        Some(field) => format!("Sorry, I didn't catch that. {}", field_prompt(field, config)),
        None => "Sorry, I didn't catch that.".to_string(),
    }
}

/// Re-prompt after a candidate was rejected.
pub fn rejected(reason: &str, field: IntakeField, config: &IntakeConfig) -> String {
    format!(
        "That doesn't look right: {reason}. {}",
        field_prompt(field, config)
    )
}

/// Re-prompt when the doctor/location pair has no open slots.
pub fn no_availability(doctor: &str, location: Option<&str>, alternatives: &[&str]) -> String {
    let subject = match location {
        Some(location) => format!("{doctor} has no open slots at {location}"),
        None => format!("{doctor} has no open slots at any of our locations"),
    };
    match (location, alternatives.is_empty()) {
        (Some(_), false) => format!(
            "Sorry, {subject}. Please choose a different location: {}",
            alternatives.join(", ")
        ),
        (Some(_), true) => format!("Sorry, {subject}. Please try a different location."),
        (None, _) => format!("Sorry, {subject}. Please choose a different doctor."),
    }
}

/// Re-prompt when the slot reference did not resolve.
pub fn invalid_selection(reason: &str, slots: &[SlotCandidate]) -> String {
    format!("{reason}.\n\n{}", slot_list(slots))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn slot() -> SlotCandidate {
        SlotCandidate {
            doctor: "Dr. Smith".into(),
            location: "Downtown Clinic".into(),
            start_time: NaiveDate::from_ymd_opt(2026, 10, 19)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            duration_minutes: 30,
        }
    }

    #[test]
    fn doctor_prompt_lists_catalog() {
        let config = IntakeConfig::default();
        let prompt = field_prompt(IntakeField::Doctor, &config);
        assert!(prompt.contains("Options: Dr. Smith, Dr. Sharma, Dr. Iyer"));
    }

    #[test]
    fn open_ended_prompt_shows_examples() {
        let config = IntakeConfig {
            open_ended_doctor_location: true,
            ..IntakeConfig::default()
        };
        let prompt = field_prompt(IntakeField::Location, &config);
        assert!(prompt.contains("(e.g. Downtown Clinic"));
    }

    #[test]
    fn slot_list_is_one_based() {
        let list = slot_list(&[slot(), slot()]);
        assert!(list.contains("- **1**. 2026-10-19 09:00 with Dr. Smith"));
        assert!(list.contains("- **2**."));
        assert!(!list.contains("**0**"));
    }

    #[test]
    fn rejection_names_constraint() {
        let config = IntakeConfig::default();
        let text = rejected(
            "date of birth must be a valid past calendar date",
            IntakeField::DateOfBirth,
            &config,
        );
        assert!(text.contains("date of birth must be a valid past calendar date"));
        assert!(text.contains("YYYY-MM-DD"));
    }

    #[test]
    fn no_availability_variants() {
        let text = no_availability("Dr. Iyer", Some("Downtown Clinic"), &["Uptown"]);
        assert!(text.contains("no open slots at Downtown Clinic"));
        assert!(text.contains("different location: Uptown"));

        let text = no_availability("Dr. Iyer", None, &[]);
        assert!(text.contains("different doctor"));
    }

    #[test]
    fn confirm_prompt_uses_name() {
        let mut record = PatientRecord::default();
        record.confirm(IntakeField::Name, "Jane Doe".into());
        let text = confirm_prompt(&record, &slot());
        assert!(text.starts_with("Thanks, Jane Doe."));
        assert!(text.contains("yes"));
    }
}
