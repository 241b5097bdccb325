use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::DEFAULT_MAX_MESSAGES;

pub const MIN_MAX_MESSAGES: usize = 10;
pub const MAX_MAX_MESSAGES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Outgoing message typed by the user; the id is the send time in milliseconds.
    pub fn user(content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: now.timestamp_millis().to_string(),
            content: content.into(),
            role: Role::User,
            timestamp: now,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            role: Role::Assistant,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationConfig {
    pub agent_name: String,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_messages: Option<usize>,
}

impl ConversationConfig {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            conversation_id: String::new(),
            max_messages: None,
        }
    }

    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = id.into();
        self
    }

    pub fn with_max_messages(mut self, max: usize) -> Self {
        self.max_messages = Some(max);
        self
    }

    pub fn has_conversation(&self) -> bool {
        !self.conversation_id.trim().is_empty()
    }

    /// History bound in effect: the configured value clamped to 10..=1000, or 100.
    pub fn effective_max_messages(&self) -> usize {
        self.max_messages
            .map(|m| m.clamp(MIN_MAX_MESSAGES, MAX_MAX_MESSAGES))
            .unwrap_or(DEFAULT_MAX_MESSAGES)
    }
}
