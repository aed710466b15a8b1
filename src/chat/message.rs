use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    // older exports call the assistant "bot"
    #[serde(alias = "bot")]
    Assistant,
}

impl Sender {
    pub fn role(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }
}

/// One transcript entry. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    sender: Sender,
    text: String,
    timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, text)
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// `{role}: {text}`, the line format used in every prompt.
    pub fn prompt_line(&self) -> String {
        format!("{}: {}", self.sender.role(), self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_bot_sender_reads_as_assistant() {
        let sender: Sender = serde_json::from_str("\"bot\"").unwrap();
        assert_eq!(sender, Sender::Assistant);
        assert_eq!(serde_json::to_string(&sender).unwrap(), "\"assistant\"");
    }

    #[test]
    fn prompt_line_uses_the_role_name() {
        assert_eq!(Message::user("I feel tired").prompt_line(), "user: I feel tired");
        assert_eq!(Message::assistant("Why?").prompt_line(), "assistant: Why?");
    }
}
