//! Terminal channel: one local patient chatting over stdin/stdout.
//!
//! The controller greets a conversation on its first message, so the stream
//! opens with a synthetic `hello` before anything is typed. Every line
//! belongs to the conversation `cli:<user_id>`.

use async_trait::async_trait;
use futures::{StreamExt, future, stream};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse, StatusUpdate};
use crate::error::ChannelError;

const CHANNEL_NAME: &str = "cli";
const OPENING_LINE: &str = "hello";

pub struct CliChannel {
    user_id: String,
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl CliChannel {
    pub fn new() -> Self {
        Self::for_user("local-user")
    }

    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    fn message(&self, content: &str) -> IncomingMessage {
        IncomingMessage::new(CHANNEL_NAME, &self.user_id, content)
    }

    fn send_failed(&self, e: std::io::Error) -> ChannelError {
        ChannelError::SendFailed {
            name: CHANNEL_NAME.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Forward non-blank stdin lines until EOF or the receiver goes away.
async fn read_patient_lines(user_id: String, tx: mpsc::UnboundedSender<IncomingMessage>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read stdin");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            eprint!("> ");
            continue;
        }
        if tx.send(IncomingMessage::new(CHANNEL_NAME, &user_id, line)).is_err() {
            break;
        }
    }
    tracing::debug!(user_id = %user_id, "stdin closed");
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(read_patient_lines(self.user_id.clone(), tx));

        let typed = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });
        let opening = stream::once(future::ready(self.message(OPENING_LINE)));
        Ok(Box::pin(opening.chain(typed)))
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let mut stdout = tokio::io::stdout();
        let text = format!("\n{}\n\n", response.content);
        stdout
            .write_all(text.as_bytes())
            .await
            .map_err(|e| self.send_failed(e))?;
        stdout.flush().await.map_err(|e| self.send_failed(e))?;
        eprint!("> ");
        Ok(())
    }

    async fn send_status(&self, status: StatusUpdate) -> Result<(), ChannelError> {
        let StatusUpdate::Booked {
            session_id,
            artifacts,
        } = status;
        eprintln!("📬 {artifacts} outbox artifacts written for session {session_id}");
        Ok(())
    }
}
