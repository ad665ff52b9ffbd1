//! Message model representing a single chat message

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ConversationId, UserId};

/// Unique identifier for a message (backend row id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    /// The dashboard operator or site visitor
    User,
    /// The automated agent
    Bot,
}

/// A message within a conversation
///
/// Messages are append-only: this client never edits or deletes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub content: String,
    pub sender_type: SenderType,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_from_user(&self) -> bool {
        self.sender_type == SenderType::User
    }

    /// Short clock label, e.g. "3:07 PM"
    pub fn time_label(&self) -> String {
        self.created_at.format("%-I:%M %p").to_string()
    }
}

/// Insert payload for a new message
#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub content: String,
    pub sender_type: SenderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sender_type_wire_format() {
        assert_eq!(serde_json::to_value(SenderType::User).unwrap(), "user");
        assert_eq!(serde_json::to_value(SenderType::Bot).unwrap(), "bot");
    }

    #[test]
    fn test_time_label() {
        let msg = Message {
            id: MessageId::new("m1"),
            conversation_id: ConversationId::new("c1"),
            user_id: None,
            content: "hello".to_string(),
            sender_type: SenderType::Bot,
            created_at: Utc.with_ymd_and_hms(2024, 8, 9, 15, 7, 0).unwrap(),
        };
        assert_eq!(msg.time_label(), "3:07 PM");
        assert!(!msg.is_from_user());
    }
}
