//! Chat message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChatMessageType {
    #[default]
    Message,
    SuperChat,
    System,
    ModAction,
}

/// Optional extras attached to paid or highlighted messages.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// A single chat message sent during a live event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message ID
    pub id: String,
    /// Event the message belongs to
    pub event_id: String,
    /// Author user ID
    pub user_id: String,
    /// Author username
    pub username: String,
    /// Author display name
    pub display_name: String,
    /// Author avatar URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Message body
    pub content: String,
    /// Message kind
    #[serde(rename = "type", default)]
    pub kind: ChatMessageType,
    /// When the message was sent
    pub timestamp: DateTime<Utc>,
    /// Badges shown next to the author
    #[serde(default)]
    pub badges: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChatMessageMetadata>,
}

impl ChatMessage {
    /// Create a plain text message.
    pub fn new(
        event_id: impl Into<String>,
        user_id: impl Into<String>,
        username: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let username = username.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_id: event_id.into(),
            user_id: user_id.into(),
            display_name: username.clone(),
            username,
            avatar: None,
            content: content.into(),
            kind: ChatMessageType::Message,
            timestamp: Utc::now(),
            badges: Vec::new(),
            metadata: None,
        }
    }
}
