use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::OutboxError;
use crate::intake::IntakeSession;

use super::{ArtifactKind, OutboxArtifact, OutboxStore, render};

/// Produces the email, SMS and form artifacts for a finished session.
pub struct OutboxEmitter {
    store: Arc<dyn OutboxStore>,
}

impl OutboxEmitter {
    pub fn new(store: Arc<dyn OutboxStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn OutboxStore> {
        &self.store
    }

    /// Whether every artifact kind is already stored for `session_id`.
    pub async fn is_emitted(&self, session_id: Uuid) -> Result<bool, OutboxError> {
        for kind in ArtifactKind::ALL {
            if self.store.get(session_id, kind).await?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Emit one artifact per kind for `session`.
    ///
    /// The session must be `Done`. Calling this again for the same session
    /// returns the artifacts already stored and writes nothing new.
    pub async fn emit(&self, session: &IntakeSession) -> Result<Vec<OutboxArtifact>, OutboxError> {
        let session_id = session.id();
        if !session.is_done() {
            let stage = session.stage();
            error!(%session_id, %stage, "Outbox emission requested before booking was confirmed");
            return Err(OutboxError::ContractViolation {
                session_id,
                reason: format!("session is at stage {stage}, expected done"),
            });
        }

        let mut artifacts = Vec::with_capacity(ArtifactKind::ALL.len());
        for kind in ArtifactKind::ALL {
            if let Some(existing) = self.store.get(session_id, kind).await? {
                artifacts.push(existing);
                continue;
            }
            let payload = render::render(kind, session).inspect_err(|e| {
                error!(%session_id, %kind, error = %e, "Failed to render outbox artifact");
            })?;
            let artifact = OutboxArtifact {
                session_id,
                kind,
                payload,
                emitted_at: Utc::now(),
            };
            artifacts.push(self.store.put_if_absent(artifact).await?);
        }

        info!(%session_id, count = artifacts.len(), "Outbox artifacts emitted");
        Ok(artifacts)
    }
}
