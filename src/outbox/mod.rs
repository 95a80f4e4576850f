//! Simulated outbox: the email, SMS and intake form produced once a
//! booking is confirmed. Nothing is delivered; artifacts are stored so they
//! can be inspected.

pub mod emitter;
pub mod render;
pub mod store;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::availability::SlotCandidate;

pub use emitter::OutboxEmitter;
pub use store::{FileOutbox, MemoryOutbox, OutboxStore};

/// The kinds of notification emitted for a completed booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Email,
    Sms,
    Form,
}

impl ArtifactKind {
    /// Every kind, in emission order.
    pub const ALL: [ArtifactKind; 3] = [ArtifactKind::Email, ArtifactKind::Sms, ArtifactKind::Form];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Form => "form",
        }
    }

    /// File name of the human-readable rendering stored next to the record.
    pub fn rendering_file_name(&self) -> &'static str {
        match self {
            Self::Email => "email.eml",
            Self::Sms => "sms.txt",
            Self::Form => "form.txt",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendered content of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPayload {
    pub subject: String,
    /// Text as it would be delivered. For email this is the whole message.
    pub body: String,
    /// Confirmed patient fields keyed by field name.
    pub fields: BTreeMap<String, String>,
    pub slot: SlotCandidate,
}

/// A stored outbox record. Written once per `(session_id, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxArtifact {
    pub session_id: Uuid,
    pub kind: ArtifactKind,
    pub payload: ArtifactPayload,
    pub emitted_at: DateTime<Utc>,
}

impl OutboxArtifact {
    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            session_id: self.session_id,
            kind: self.kind,
            subject: self.payload.subject.clone(),
            emitted_at: self.emitted_at,
        }
    }
}

/// Listing entry for stored artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub session_id: Uuid,
    pub kind: ArtifactKind,
    pub subject: String,
    pub emitted_at: DateTime<Utc>,
}
