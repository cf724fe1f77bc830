//! Session message types as seen by the dispatcher.
//!
//! These are the normalized shapes produced at the backend boundary; the
//! dispatcher never inspects raw wire payloads.

use serde::{Deserialize, Serialize};

use crate::model::ModelCandidate;

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One content part of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    Text { text: String },
    Reasoning { text: String },
    ToolCall { tool: String },
    Other,
}

impl MessagePart {
    /// Text carried by text/reasoning parts.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text } | Self::Reasoning { text } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMessage {
    /// Message id; ids sort in creation order.
    pub id: Option<String>,
    pub role: MessageRole,
    /// Creation timestamp (Unix ms)
    pub created_at: Option<i64>,
    /// Why the assistant stopped (`stop`, `tool-calls`, ...)
    pub finish_reason: Option<String>,
    /// Agent that handled this message, when recorded
    pub agent: Option<String>,
    /// Model used for this message, when recorded
    pub model: Option<ModelCandidate>,
    pub parts: Vec<MessagePart>,
}

impl SessionMessage {
    pub fn new(role: MessageRole) -> Self {
        Self {
            id: None,
            role,
            created_at: None,
            finish_reason: None,
            agent: None,
            model: None,
            parts: Vec::new(),
        }
    }

    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(MessageRole::User)
            .with_id(id)
            .with_part(MessagePart::Text { text: text.into() })
    }

    pub fn assistant(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant)
            .with_id(id)
            .with_part(MessagePart::Text { text: text.into() })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_finish(mut self, reason: impl Into<String>) -> Self {
        self.finish_reason = Some(reason.into());
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_model(mut self, model: ModelCandidate) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_part(mut self, part: MessagePart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }

    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }

    /// Concatenated text and reasoning content, newline separated.
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(MessagePart::text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Whether the message carries any non-blank text or reasoning.
    pub fn has_text_content(&self) -> bool {
        self.parts
            .iter()
            .filter_map(MessagePart::text)
            .any(|text| !text.trim().is_empty())
    }
}

/// Activity state of a session as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Busy,
}
