//! The validated request shape at the HTTP boundary.
//!
//! Deliberately does not derive `deny_unknown_fields`: OpenAI's own API is
//! forward-compatible with extra fields, and so is this one.

use serde::{Deserialize, Serialize};

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// `POST /v1/chat/completions` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// Basic structural validation beyond what serde already enforces:
    /// a request with no messages, or only empty-role messages, is malformed.
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("model must not be empty".to_owned());
        }
        if self.messages.is_empty() {
            return Err("messages must not be empty".to_owned());
        }
        for message in &self.messages {
            if message.role.trim().is_empty() {
                return Err("message role must not be empty".to_owned());
            }
        }
        Ok(())
    }
}
