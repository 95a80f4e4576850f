//! Patient intake: a staged conversation that collects and validates
//! patient details, then books one slot.
//!
//! The machine is pure: it consumes one utterance against an explicit
//! `IntakeSession` and returns the next prompt. Side effects (outbox
//! artifacts, session bookkeeping) live in the controller.

pub mod extractor;
pub mod machine;
pub mod model;
pub mod prompts;
pub mod session;
pub mod state;
pub mod validators;

pub use extractor::{FieldExtractor, RuleExtractor, SlotReference};
pub use machine::{IntakeIssue, IntakeMachine, TurnEvent, TurnOutcome};
pub use model::{BookingSelection, FieldState, IntakeField, PatientRecord};
pub use session::IntakeSession;
pub use state::IntakeStage;
pub use validators::ValidationError;
