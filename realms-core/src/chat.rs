//! The companion: a side channel for questions about the world.
//!
//! Chat never touches game state. The provider is stateless; the transcript
//! kept here is for display only.

use crate::provider::ChatProvider;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

pub const GREETING: &str = "I am your guide. Ask me anything about this world.";

/// Shown when the provider answered with nothing.
pub const SILENT_REPLY: &str = "I couldn't hear you clearly.";

/// Shown when the provider call failed.
pub const UNREACHABLE_REPLY: &str = "The connection to the ethereal plane is weak...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    Player,
    Companion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

pub struct Companion {
    provider: Arc<dyn ChatProvider>,
    transcript: Mutex<Vec<ChatMessage>>,
}

impl Companion {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            provider,
            transcript: Mutex::new(vec![ChatMessage::new(ChatRole::Companion, GREETING)]),
        }
    }

    /// Ask a question. Returns the reply, or `None` for a blank message.
    ///
    /// Provider failures never surface as errors; they become a stock reply.
    pub async fn ask(&self, message: &str, context_summary: &str) -> Option<String> {
        let message = message.trim();
        if message.is_empty() {
            return None;
        }
        self.transcript()
            .push(ChatMessage::new(ChatRole::Player, message));

        let reply = match self.provider.ask(message, context_summary).await {
            Ok(text) if text.trim().is_empty() => {
                debug!("companion returned an empty reply");
                SILENT_REPLY.to_string()
            }
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "companion request failed");
                UNREACHABLE_REPLY.to_string()
            }
        };

        self.transcript()
            .push(ChatMessage::new(ChatRole::Companion, reply.clone()));
        Some(reply)
    }

    pub fn transcript_snapshot(&self) -> Vec<ChatMessage> {
        self.transcript().clone()
    }

    fn transcript(&self) -> MutexGuard<'_, Vec<ChatMessage>> {
        self.transcript.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
