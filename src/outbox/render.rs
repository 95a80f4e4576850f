//! Deterministic rendering of a completed booking into artifact payloads.

use std::collections::BTreeMap;
use std::time::SystemTime;

use lettre::Message;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;

use crate::availability::SlotCandidate;
use crate::error::OutboxError;
use crate::intake::{IntakeField, IntakeSession};

use super::{ArtifactKind, ArtifactPayload};

const SENDER: &str = "Scheduling Agent <scheduling@clinic.example>";
const SIGNATURE: &str = "- Scheduling Agent";

/// Everything a rendering needs, borrowed from a finished session.
struct Booking<'a> {
    session: &'a IntakeSession,
    fields: BTreeMap<String, String>,
    slot: &'a SlotCandidate,
}

impl Booking<'_> {
    fn field(&self, field: IntakeField) -> &str {
        self.fields
            .get(&field.to_string())
            .map(String::as_str)
            .unwrap_or_default()
    }

    fn first_name(&self) -> &str {
        self.field(IntakeField::Name)
            .split_whitespace()
            .next()
            .unwrap_or("there")
    }

    fn when(&self) -> String {
        self.slot.start_time.format("%Y-%m-%d %H:%M").to_string()
    }

    fn payload(&self, subject: String, body: String) -> ArtifactPayload {
        ArtifactPayload {
            subject,
            body,
            fields: self.fields.clone(),
            slot: self.slot.clone(),
        }
    }
}

/// Collect the confirmed fields and the selection. Fails if anything is
/// missing, so no partial record is ever rendered.
fn booking(session: &IntakeSession) -> Result<Booking<'_>, OutboxError> {
    let violation = |reason: String| OutboxError::ContractViolation {
        session_id: session.id(),
        reason,
    };

    let mut fields = BTreeMap::new();
    for field in IntakeField::ALL {
        let value = session
            .record()
            .confirmed(field)
            .ok_or_else(|| violation(format!("{field} is not confirmed")))?;
        fields.insert(field.to_string(), value.to_string());
    }
    let selection = session
        .selection()
        .ok_or_else(|| violation("no slot has been selected".to_string()))?;

    Ok(Booking {
        session,
        fields,
        slot: &selection.slot,
    })
}

/// Render one artifact kind for a completed session.
pub fn render(kind: ArtifactKind, session: &IntakeSession) -> Result<ArtifactPayload, OutboxError> {
    let booking = booking(session)?;
    match kind {
        ArtifactKind::Email => render_email(&booking),
        ArtifactKind::Sms => Ok(render_sms(&booking)),
        ArtifactKind::Form => Ok(render_form(&booking)),
    }
}

/// Address the confirmation is sent to: `first.last@example.com`.
pub fn patient_address(name: &str) -> String {
    let words: Vec<String> = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect();
    match words.as_slice() {
        [] => "patient@example.com".to_string(),
        [only] => format!("{only}@example.com"),
        [first, .., last] => format!("{first}.{last}@example.com"),
    }
}

fn render_email(booking: &Booking<'_>) -> Result<ArtifactPayload, OutboxError> {
    let err = |reason: String| OutboxError::Render {
        kind: ArtifactKind::Email,
        reason,
    };
    let slot = booking.slot;
    let subject = format!("Appointment Confirmed - {}", booking.when());
    let text = format!(
        "Hi {first},\n\n\
         Your appointment with {doctor} is confirmed.\n\
         Location: {location}\n\
         Date: {date} at {time} (Duration: {minutes} min)\n\n\
         Your new patient intake form follows in a separate message.\n\n\
         {SIGNATURE}\n",
        first = booking.first_name(),
        doctor = slot.doctor,
        location = slot.location,
        date = slot.start_time.format("%Y-%m-%d"),
        time = slot.start_time.format("%H:%M"),
        minutes = slot.duration_minutes,
    );

    let from: Mailbox = SENDER
        .parse()
        .map_err(|e| err(format!("invalid sender address: {e}")))?;
    let name = booking.field(IntakeField::Name);
    let to = Mailbox::new(
        Some(name.to_string()),
        patient_address(name)
            .parse()
            .map_err(|e| err(format!("invalid patient address: {e}")))?,
    );
    let selected_at = booking
        .session
        .selection()
        .map(|s| SystemTime::from(s.selected_at))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(subject.clone())
        .date(selected_at)
        .message_id(Some(format!(
            "<{}.confirmation@clinic.example>",
            booking.session.id()
        )))
        .header(ContentType::TEXT_PLAIN)
        .body(text)
        .map_err(|e| err(format!("failed to build message: {e}")))?;
    let body = String::from_utf8(message.formatted())
        .map_err(|e| err(format!("message is not valid UTF-8: {e}")))?;

    Ok(booking.payload(subject, body))
}

fn render_sms(booking: &Booking<'_>) -> ArtifactPayload {
    let slot = booking.slot;
    let body = format!(
        "CONFIRMED: {} with {} at {}",
        booking.when(),
        slot.doctor,
        slot.location
    );
    booking.payload(format!("SMS to {}", booking.field(IntakeField::Name)), body)
}

fn render_form(booking: &Booking<'_>) -> ArtifactPayload {
    let mut lines = vec!["NEW PATIENT INTAKE FORM".to_string(), String::new()];
    for field in IntakeField::ALL {
        lines.push(format!("{}: {}", field.label(), booking.field(field)));
    }
    lines.push(format!("Appointment: {}", booking.slot.label()));
    lines.push(String::new());

    booking.payload(
        format!("New Patient Intake Form - {}", booking.field(IntakeField::Name)),
        lines.join("\n"),
    )
}
