//! Error types for intake-assist.

use uuid::Uuid;

use crate::intake::state::IntakeStage;
use crate::outbox::ArtifactKind;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Intake error: {0}")]
    Intake(#[from] IntakeError),

    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },
}

/// Caller errors at the state machine boundary.
///
/// Extraction misses and validation failures are not errors: they come back
/// as re-prompts inside a `TurnOutcome`.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IntakeError {
    #[error("Utterance must not be empty")]
    EmptyUtterance,

    #[error("Session {id} is already complete")]
    SessionComplete { id: Uuid },

    #[error("Session {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: IntakeStage,
        to: IntakeStage,
    },
}

/// Outbox storage and emission errors.
#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    /// The emitter was called for a session that has not reached `Done`,
    /// or whose record is incomplete. Always a caller bug.
    #[error("Emission contract violated for session {session_id}: {reason}")]
    ContractViolation { session_id: Uuid, reason: String },

    #[error("Failed to render {kind} artifact: {reason}")]
    Render { kind: ArtifactKind, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for intake-assist.
pub type Result<T> = std::result::Result<T, Error>;
