//! Channel abstraction for message I/O, and the loop that feeds channel
//! messages to the session controller.

pub mod cli;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use futures::{Stream, StreamExt};
use uuid::Uuid;

use crate::controller::SessionController;
use crate::error::{ChannelError, Error};

pub use cli::CliChannel;

/// A message received from a channel.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Per-message id, carried into the handling logs.
    pub id: Uuid,
    pub channel: String,
    /// Sender identity. Used as the conversation key.
    pub user_id: String,
    pub content: String,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(channel: &str, user_id: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            user_id: user_id.to_string(),
            content: content.to_string(),
            received_at: Utc::now(),
        }
    }

    /// Conversation key for the controller: one session per channel user.
    pub fn conversation_key(&self) -> String {
        format!("{}:{}", self.channel, self.user_id)
    }

    /// Time since the channel received this message.
    pub fn queued_for(&self) -> TimeDelta {
        Utc::now() - self.received_at
    }
}

/// A reply sent back on a channel.
#[derive(Debug, Clone)]
pub struct OutgoingResponse {
    pub content: String,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Side-channel notices shown alongside replies.
#[derive(Debug, Clone)]
pub enum StatusUpdate {
    /// Booking confirmed and artifacts written.
    Booked { session_id: Uuid, artifacts: usize },
}

pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start receiving. The stream ends when the channel closes.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    async fn send_status(&self, status: StatusUpdate) -> Result<(), ChannelError>;
}

/// Feed every message from `channel` to `controller` until the stream ends
/// or Ctrl+C. Idle sessions are pruned every `prune_interval`.
pub async fn serve(
    channel: Arc<dyn Channel>,
    controller: Arc<SessionController>,
    prune_interval: Duration,
) -> Result<(), Error> {
    let mut messages = channel.start().await?;

    let pruner = Arc::clone(&controller);
    let pruning_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(prune_interval);
        interval.tick().await; // Skip immediate first tick
        loop {
            interval.tick().await;
            let pruned = pruner.prune_idle().await;
            if pruned > 0 {
                tracing::info!(pruned, "Pruned idle sessions");
            }
        }
    });

    tracing::info!(channel = channel.name(), "Listening for messages");

    loop {
        let message = tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down...");
                break;
            }
            msg = messages.next() => match msg {
                Some(m) => m,
                None => {
                    tracing::info!(channel = channel.name(), "Channel stream ended");
                    break;
                }
            },
        };

        handle_incoming(channel.as_ref(), &controller, &message).await;
    }

    pruning_handle.abort();
    Ok(())
}

/// Route one message and deliver the reply. Failures are logged and
/// reported back on the channel.
pub async fn handle_incoming(
    channel: &dyn Channel,
    controller: &SessionController,
    message: &IncomingMessage,
) {
    let key = message.conversation_key();
    tracing::debug!(
        message_id = %message.id,
        conversation = %key,
        queued_ms = message.queued_for().num_milliseconds(),
        "Handling message"
    );
    let text = match controller.handle_message(&key, &message.content).await {
        Ok(reply) => {
            if !reply.artifacts.is_empty() {
                let status = StatusUpdate::Booked {
                    session_id: reply.session_id,
                    artifacts: reply.artifacts.len(),
                };
                if let Err(e) = channel.send_status(status).await {
                    tracing::warn!(channel = channel.name(), error = %e, "Failed to send status");
                }
            }
            reply.text
        }
        Err(e) => {
            tracing::error!(message_id = %message.id, conversation = %key, error = %e, "Error handling message");
            format!("Error: {e}")
        }
    };

    if let Err(e) = channel.respond(message, OutgoingResponse::text(text)).await {
        tracing::error!(channel = channel.name(), message_id = %message.id, error = %e, "Failed to deliver response");
    }
}
