use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::message::{Message, Sender};
use crate::emotion::AggregatedEmotion;
use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Collecting,
    Ended,
}

/// One conversation. Once `Ended` the transcript is frozen.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    status: SessionStatus,
    messages: Vec<Message>,
    final_emotion: AggregatedEmotion,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            status: SessionStatus::Collecting,
            messages: Vec::new(),
            final_emotion: AggregatedEmotion::default(),
        }
    }

    /// A session opened by the assistant's greeting.
    pub fn with_greeting(greeting: &str) -> Self {
        let mut session = Self::new();
        session.messages.push(Message::assistant(greeting));
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_ended(&self) -> bool {
        self.status == SessionStatus::Ended
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn final_emotion(&self) -> &AggregatedEmotion {
        &self.final_emotion
    }

    pub(crate) fn append(&mut self, message: Message) -> Result<(), SessionError> {
        if self.is_ended() {
            return Err(SessionError::SessionEnded);
        }
        self.messages.push(message);
        Ok(())
    }

    pub(crate) fn record_emotion(&mut self, emotion: AggregatedEmotion) -> Result<(), SessionError> {
        if self.is_ended() {
            return Err(SessionError::SessionEnded);
        }
        self.final_emotion = emotion;
        Ok(())
    }

    /// Appends the closing message and freezes the session. Returns `false` if it was
    /// already ended.
    pub(crate) fn end(&mut self, closing_message: &str) -> bool {
        if self.is_ended() {
            debug!("Session {} already ended", self.id);
            return false;
        }
        self.messages.push(Message::assistant(closing_message));
        self.status = SessionStatus::Ended;
        info!(
            "Session {} ended with {} messages",
            self.id,
            self.messages.len()
        );
        true
    }

    pub fn to_export(&self) -> SessionExport {
        SessionExport {
            messages: self
                .messages
                .iter()
                .map(|message| ExportedMessage {
                    sender: message.sender(),
                    text: message.text().to_string(),
                })
                .collect(),
            final_emotion: self.final_emotion.label.clone(),
        }
    }

    /// Pure read of the current state; does not affect the session status.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_export())
    }

    pub fn from_json(json: &str) -> Result<SessionExport, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedMessage {
    pub sender: Sender,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExport {
    pub messages: Vec<ExportedMessage>,
    pub final_emotion: String,
}
