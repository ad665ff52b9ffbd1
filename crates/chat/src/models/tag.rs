//! Tag model and the conversation/tag join

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Conversation, ConversationId};

/// Unique identifier for a tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(pub String);

impl TagId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TagId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TagId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An entry in the global tag vocabulary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    /// Color name or hex string, rendered as-is
    pub color: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Insert payload for a new tag
#[derive(Debug, Clone, Serialize)]
pub struct NewTag {
    pub name: String,
    pub color: String,
}

/// Join row linking a conversation to a tag (unique per pair)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationTag {
    pub conversation_id: ConversationId,
    pub tag_id: TagId,
}

/// A conversation together with its tag set, as reconstructed by a join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationWithTags {
    pub conversation: Conversation,
    pub tags: Vec<Tag>,
}

impl ConversationWithTags {
    pub fn has_tag(&self, tag_id: &TagId) -> bool {
        self.tags.iter().any(|t| &t.id == tag_id)
    }

    /// True if every id in `required` is in this conversation's tag set
    pub fn has_all_tags(&self, required: &[TagId]) -> bool {
        required.iter().all(|id| self.has_tag(id))
    }
}
