//! SessionController: owns the live intake sessions and routes each
//! inbound message to its conversation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::availability::SlotCandidate;
use crate::error::Result;
use crate::intake::{IntakeMachine, IntakeSession, IntakeStage, prompts};
use crate::outbox::{OutboxArtifact, OutboxEmitter, OutboxStore};

/// Typing this resets the conversation.
pub const RESTART_COMMAND: &str = "restart";

const DISPATCHED: &str = "\n\nI've sent a confirmation email and SMS and dispatched the intake form.";

/// What the controller sends back for one inbound message.
#[derive(Debug, Clone)]
pub struct ControllerReply {
    pub session_id: Uuid,
    pub stage: IntakeStage,
    pub text: String,
    /// Artifacts emitted by this message. Empty unless the booking was just confirmed.
    pub artifacts: Vec<OutboxArtifact>,
}

/// Read-only view of a session for the status API.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: Uuid,
    pub stage: IntakeStage,
    pub confirmed_fields: usize,
    pub turn_count: u32,
    pub selection: Option<SlotCandidate>,
    pub updated_at: DateTime<Utc>,
}

impl SessionStatus {
    fn of(session: &IntakeSession) -> Self {
        Self {
            session_id: session.id(),
            stage: session.stage(),
            confirmed_fields: session.record().confirmed_count(),
            turn_count: session.turn_count(),
            selection: session.selection().map(|s| s.slot.clone()),
            updated_at: session.updated_at(),
        }
    }
}

type SessionHandle = Arc<Mutex<IntakeSession>>;

/// Maps conversation keys (a channel's user or thread id) to sessions.
///
/// Turns within one conversation run one at a time; different
/// conversations proceed independently.
pub struct SessionController {
    machine: Arc<IntakeMachine>,
    emitter: OutboxEmitter,
    sessions: RwLock<HashMap<String, SessionHandle>>,
    idle_timeout: Duration,
}

impl SessionController {
    pub fn new(machine: IntakeMachine, emitter: OutboxEmitter, idle_timeout: Duration) -> Self {
        Self {
            machine: Arc::new(machine),
            emitter,
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    pub fn machine(&self) -> &IntakeMachine {
        &self.machine
    }

    pub fn outbox(&self) -> &Arc<dyn OutboxStore> {
        self.emitter.store()
    }

    /// Handle one inbound message for `conversation_key`.
    ///
    /// The first message of a conversation opens a session and is answered
    /// with the greeting. `restart` discards the session and greets again.
    /// Once a booking is confirmed the outbox artifacts are emitted before
    /// the reply is returned. If that emission failed, the next message on
    /// the finished conversation tries again.
    pub async fn handle_message(&self, conversation_key: &str, text: &str) -> Result<ControllerReply> {
        let text = text.trim();

        if text.eq_ignore_ascii_case(RESTART_COMMAND) {
            let session = IntakeSession::new();
            let reply = self.reply(&session, self.machine.opening_prompt(&session));
            self.sessions
                .write()
                .await
                .insert(conversation_key.to_string(), Arc::new(Mutex::new(session)));
            tracing::info!(conversation = conversation_key, session_id = %reply.session_id, "Session restarted");
            return Ok(reply);
        }

        let (handle, created) = self.session_for(conversation_key).await;
        let mut session = handle.lock().await;

        if created {
            return Ok(self.reply(&session, self.machine.opening_prompt(&session)));
        }

        if session.is_done() {
            if !self.emitter.is_emitted(session.id()).await? {
                tracing::warn!(session_id = %session.id(), "Retrying outbox emission for finished session");
                let prompt = self.machine.current_prompt(&session);
                return self.dispatch(&session, prompt).await;
            }
            let booked = session
                .selection()
                .map(|s| prompts::booked(&s.slot))
                .unwrap_or_default();
            let text = format!(
                "You're all set. {booked} Type `{RESTART_COMMAND}` to book another appointment."
            );
            return Ok(self.reply(&session, text));
        }

        let outcome = self.machine.handle_turn(&mut session, text)?;
        if outcome.is_complete() {
            return self.dispatch(&session, outcome.prompt).await;
        }
        Ok(self.reply(&session, outcome.prompt))
    }

    /// Emit the finished session's artifacts and report them in the reply.
    async fn dispatch(&self, session: &IntakeSession, prompt: String) -> Result<ControllerReply> {
        let artifacts = self.emitter.emit(session).await?;
        let mut reply = self.reply(session, prompt);
        reply.artifacts = artifacts;
        reply.text.push_str(DISPATCHED);
        Ok(reply)
    }

    fn reply(&self, session: &IntakeSession, text: String) -> ControllerReply {
        ControllerReply {
            session_id: session.id(),
            stage: session.stage(),
            text,
            artifacts: Vec::new(),
        }
    }

    /// The conversation's session, creating one if needed. The flag is true
    /// when the session was created by this call.
    async fn session_for(&self, conversation_key: &str) -> (SessionHandle, bool) {
        if let Some(handle) = self.sessions.read().await.get(conversation_key) {
            return (Arc::clone(handle), false);
        }

        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.get(conversation_key) {
            return (Arc::clone(handle), false);
        }
        let session = IntakeSession::new();
        tracing::info!(conversation = conversation_key, session_id = %session.id(), "Session opened");
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(conversation_key.to_string(), Arc::clone(&handle));
        (handle, true)
    }

    pub async fn status(&self, conversation_key: &str) -> Option<SessionStatus> {
        let handle = self.sessions.read().await.get(conversation_key).cloned()?;
        let session = handle.lock().await;
        Some(SessionStatus::of(&session))
    }

    /// Snapshot of a conversation's session.
    pub async fn session(&self, conversation_key: &str) -> Option<IntakeSession> {
        let handle = self.sessions.read().await.get(conversation_key).cloned()?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions with no activity for longer than the idle timeout.
    /// Sessions in the middle of a turn are kept. Returns how many were dropped.
    pub async fn prune_idle(&self) -> usize {
        let Some(cutoff) = TimeDelta::from_std(self.idle_timeout)
            .ok()
            .and_then(|timeout| Utc::now().checked_sub_signed(timeout))
        else {
            return 0;
        };
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|key, handle| match handle.try_lock() {
            Ok(session) if session.updated_at() < cutoff => {
                tracing::info!(
                    conversation = key.as_str(),
                    session_id = %session.id(),
                    stage = %session.stage(),
                    "Pruning idle session"
                );
                false
            }
            _ => true,
        });

        before - sessions.len()
    }
}
