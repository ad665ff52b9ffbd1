//! Cached store state and list criteria

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::InvalidInputError;
use crate::gateway::Query;
use crate::models::{ConversationWithTags, Message, Tag, TagId};

/// Sub-filter applied on top of `status = active`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveFilter {
    #[default]
    All,
    Active,
    Starred,
    Urgent,
    Closed,
}

impl ActiveFilter {
    pub const ALL: [ActiveFilter; 5] = [
        ActiveFilter::All,
        ActiveFilter::Active,
        ActiveFilter::Starred,
        ActiveFilter::Urgent,
        ActiveFilter::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActiveFilter::All => "all",
            ActiveFilter::Active => "active",
            ActiveFilter::Starred => "starred",
            ActiveFilter::Urgent => "urgent",
            ActiveFilter::Closed => "closed",
        }
    }

    /// Add this filter's predicates to a conversations query.
    ///
    /// `closed` selects starred conversations and `active` unstarred ones;
    /// the row status stays `active` for every sub-filter.
    pub fn apply(&self, query: Query) -> Query {
        let query = query.eq("status", "active");
        match self {
            ActiveFilter::All => query,
            ActiveFilter::Active => query.eq("is_starred", false),
            ActiveFilter::Starred | ActiveFilter::Closed => query.eq("is_starred", true),
            ActiveFilter::Urgent => query.eq("is_read", false),
        }
    }
}

impl fmt::Display for ActiveFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActiveFilter {
    type Err = InvalidInputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActiveFilter::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| InvalidInputError::new(format!("Unknown filter: {}", s)))
    }
}

/// Conversation list ordering by last activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
}

impl SortOrder {
    pub fn ascending(&self) -> bool {
        matches!(self, SortOrder::Oldest)
    }

    pub fn toggled(&self) -> Self {
        match self {
            SortOrder::Newest => SortOrder::Oldest,
            SortOrder::Oldest => SortOrder::Newest,
        }
    }
}

/// Everything the store caches, as observed by views
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    /// Filtered, sorted conversation list with joined tags
    pub conversations: Vec<ConversationWithTags>,
    /// The open conversation and its tags
    pub current_conversation: Option<ConversationWithTags>,
    /// Messages of the open conversation, oldest first
    pub messages: Vec<Message>,
    /// Global tag vocabulary, by name
    pub tags: Vec<Tag>,
    pub sort_order: SortOrder,
    pub active_filter: ActiveFilter,
    pub selected_tags: Vec<TagId>,
    /// Something is in flight
    pub is_loading: bool,
    /// Message of the most recent failure, cleared when an action starts
    pub error: Option<String>,
}
