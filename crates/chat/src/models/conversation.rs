//! Conversation model representing one visitor chat session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::UserId;

/// Unique identifier for a conversation (backend row id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a conversation
///
/// Conversations are never removed; deletion is the `Deleted` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Active,
    Closed,
    Deleted,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Closed => "closed",
            ConversationStatus::Deleted => "deleted",
        }
    }
}

/// A conversation row as stored by the backend
///
/// The tag set is not part of the row; see [`super::ConversationWithTags`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    /// Owning account
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub is_starred: bool,
    #[serde(default)]
    pub status: ConversationStatus,
    /// Last activity, used for list ordering
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Title shown in lists and headers
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ => "New Conversation",
        }
    }
}

/// Insert payload for a new conversation
#[derive(Debug, Clone, Serialize)]
pub struct NewConversation {
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub is_read: bool,
    pub is_starred: bool,
    pub status: ConversationStatus,
    pub last_message_at: DateTime<Utc>,
}

impl NewConversation {
    pub fn new(user_id: UserId, title: Option<String>) -> Self {
        Self {
            user_id,
            title,
            is_read: false,
            is_starred: false,
            status: ConversationStatus::Active,
            last_message_at: Utc::now(),
        }
    }
}

/// Partial update for a conversation; only set fields are written
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ConversationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_starred: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
}

impl ConversationUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: ConversationStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn read(mut self, is_read: bool) -> Self {
        self.is_read = Some(is_read);
        self
    }

    pub fn starred(mut self, is_starred: bool) -> Self {
        self.is_starred = Some(is_starred);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn touched_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_message_at = Some(at);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
