//! Chat data models
//!
//! Defines the in-memory representation of a stored chat: its transcript,
//! the latency of each assistant reply, and the model that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the user
    User,
    /// Message from the model
    Assistant,
    /// Instruction text, prepended at inference time only
    System,
}

impl MessageRole {
    /// Convert the role to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

impl From<&str> for MessageRole {
    fn from(s: &str) -> Self {
        match s {
            "assistant" => MessageRole::Assistant,
            "system" => MessageRole::System,
            _ => MessageRole::User,
        }
    }
}

/// A single message in a chat transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the sender
    pub role: String, // Stored as "user", "assistant" or "system"
    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    /// Create a new message
    pub fn new(role: MessageRole, content: String) -> Self {
        Self {
            role: role.as_str().to_string(),
            content,
        }
    }

    /// Get the message role as enum
    pub fn role_enum(&self) -> MessageRole {
        MessageRole::from(self.role.as_str())
    }
}

/// A chat as held in memory and persisted to storage
///
/// `reply_times` and `addressed_models` are parallel sequences with one
/// entry per assistant message: the seconds the reply took and the model
/// that produced it. They are only ever appended together with the message
/// they describe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    /// Unique name identifying the chat
    pub name: String,
    /// When the chat was created (Unix timestamp); never changes
    pub created_at: i64,
    /// Ordered message transcript
    pub messages: Vec<ChatMessage>,
    /// Seconds each assistant reply took
    pub reply_times: Vec<f64>,
    /// Model that produced each assistant reply
    pub addressed_models: Vec<String>,
    /// System-level instructions; empty string means none
    ///
    /// Instructions are sent to the model as a transient system message and
    /// never appear in `messages`.
    pub instructions: String,
}

impl ChatRecord {
    /// Create a new empty chat
    pub fn new(name: String) -> Self {
        Self {
            name,
            created_at: Utc::now().timestamp(),
            messages: Vec::new(),
            reply_times: Vec::new(),
            addressed_models: Vec::new(),
            instructions: String::new(),
        }
    }

    /// Number of assistant messages in the transcript
    pub fn assistant_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role_enum() == MessageRole::Assistant)
            .count()
    }

    /// Get created_at as DateTime
    pub fn created_at_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.created_at, 0).unwrap_or_else(Utc::now)
    }
}
