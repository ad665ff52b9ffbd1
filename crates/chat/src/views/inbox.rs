//! Inbox view - conversation list on the left, open conversation on the right

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::sync::Arc;

use crate::gateway::ChangeFeed;
use crate::models::{ConversationId, ConversationStatus, ConversationUpdate, Message, TagId};
use crate::realtime::SubscriptionManager;
use crate::store::{ActiveFilter, ConversationStore, Notifier, SortOrder};

/// One line of the conversation list
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationRow {
    pub id: ConversationId,
    pub title: String,
    pub is_read: bool,
    pub is_starred: bool,
    /// Names of the conversation's tags, by name
    pub tags: Vec<String>,
    pub last_activity: DateTime<Utc>,
    pub is_selected: bool,
}

/// One bubble in the open conversation
#[derive(Debug, Clone, PartialEq)]
pub struct MessageLine {
    pub content: String,
    pub is_from_user: bool,
    pub time: String,
}

impl From<&Message> for MessageLine {
    fn from(message: &Message) -> Self {
        Self {
            content: message.content.clone(),
            is_from_user: message.is_from_user(),
            time: message.time_label(),
        }
    }
}

/// Headless inbox: list rendering data plus the actions behind its controls
pub struct InboxView {
    store: Arc<ConversationStore>,
    live: SubscriptionManager,
    notifier: Arc<dyn Notifier>,
    selected: Option<ConversationId>,
    /// Index of the selected row for keyboard navigation
    selected_index: Option<usize>,
    draft: String,
}

impl InboxView {
    pub fn new(
        store: Arc<ConversationStore>,
        feed: Arc<dyn ChangeFeed>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let live = SubscriptionManager::new(feed, store.clone());
        Self {
            store,
            live,
            notifier,
            selected: None,
            selected_index: None,
            draft: String::new(),
        }
    }

    /// Initial load: tag vocabulary and the conversation list
    pub fn load(&self) {
        self.store.fetch_tags();
        self.store.fetch_conversations();
    }

    pub fn rows(&self) -> Vec<ConversationRow> {
        self.store
            .conversations()
            .iter()
            .map(|c| ConversationRow {
                id: c.conversation.id.clone(),
                title: c.conversation.display_title().to_string(),
                is_read: c.conversation.is_read,
                is_starred: c.conversation.is_starred,
                tags: c.tags.iter().map(|t| t.name.clone()).collect(),
                last_activity: c.conversation.last_message_at,
                is_selected: self.selected.as_ref() == Some(&c.conversation.id),
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<MessageLine> {
        self.store.messages().iter().map(MessageLine::from).collect()
    }

    /// Title shown above the open conversation
    pub fn header_title(&self) -> Option<String> {
        self.store
            .current_conversation()
            .map(|c| c.conversation.display_title().to_string())
    }

    pub fn selected(&self) -> Option<&ConversationId> {
        self.selected.as_ref()
    }

    /// Open a conversation and keep it live
    pub fn select(&mut self, id: &ConversationId) -> Result<()> {
        self.live.open(id)?;
        self.selected_index = self
            .store
            .conversations()
            .iter()
            .position(|c| &c.conversation.id == id);
        self.selected = Some(id.clone());
        Ok(())
    }

    pub fn deselect(&mut self) {
        self.live.close();
        self.selected = None;
        self.selected_index = None;
    }

    /// Move selection down (next row)
    pub fn select_next(&mut self) -> Result<()> {
        let conversations = self.store.conversations();
        if conversations.is_empty() {
            return Ok(());
        }
        let max_index = conversations.len() - 1;
        // Clamp to the current list, which may have shrunk
        let next = match self.selected_index.map(|i| i.min(max_index)) {
            Some(i) if i < max_index => i + 1,
            Some(i) => i,
            None => 0,
        };
        self.select(&conversations[next].conversation.id)
    }

    /// Move selection up (previous row)
    pub fn select_previous(&mut self) -> Result<()> {
        let conversations = self.store.conversations();
        if conversations.is_empty() {
            return Ok(());
        }
        let max_index = conversations.len() - 1;
        let previous = match self.selected_index.map(|i| i.min(max_index)) {
            Some(i) if i > 0 => i - 1,
            _ => 0,
        };
        self.select(&conversations[previous].conversation.id)
    }

    pub fn toggle_read(&self) {
        let Some((id, is_read)) = self.open_conversation(|c| c.is_read) else {
            return;
        };
        self.store
            .update_conversation(&id, ConversationUpdate::new().read(!is_read));
        if self.store.error().is_none() {
            let state = if is_read { "unread" } else { "read" };
            self.notifier
                .success(&format!("Conversation marked as {}", state));
        }
    }

    pub fn toggle_star(&self) {
        if let Some((id, is_starred)) = self.open_conversation(|c| c.is_starred) {
            self.store
                .update_conversation(&id, ConversationUpdate::new().starred(!is_starred));
        }
    }

    /// Soft-delete the open conversation and close it
    pub fn delete_selected(&mut self) {
        let Some(id) = self.selected.clone() else {
            return;
        };
        self.store.update_conversation(
            &id,
            ConversationUpdate::new().status(ConversationStatus::Deleted),
        );
        if self.store.error().is_none() {
            info!("Deleted conversation {}", id.as_str());
            self.deselect();
            self.notifier.success("Conversation deleted successfully");
        }
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Send the trimmed draft to the open conversation.
    ///
    /// Returns false without sending when there is no open conversation or
    /// the draft is blank. The draft is kept if sending failed.
    pub fn send(&mut self) -> bool {
        let Some(id) = self.selected.clone() else {
            return false;
        };
        let content = self.draft.trim().to_string();
        if content.is_empty() {
            debug!("Ignoring blank message");
            return false;
        }
        self.store.send_message(&content, &id);
        if self.store.error().is_some() {
            return false;
        }
        self.draft.clear();
        true
    }

    pub fn set_filter(&self, filter: ActiveFilter) {
        self.store.set_active_filter(filter);
    }

    pub fn toggle_sort(&self) {
        let order: SortOrder = self.store.state().sort_order;
        self.store.set_sort_order(order.toggled());
    }

    pub fn toggle_tag_filter(&self, tag_id: &TagId) {
        self.store.toggle_selected_tag(tag_id);
    }

    pub fn add_tag(&self, tag_id: &TagId) {
        if let Some(id) = &self.selected {
            self.store.add_tag(id, tag_id);
        }
    }

    pub fn remove_tag(&self, tag_id: &TagId) {
        if let Some(id) = &self.selected {
            self.store.remove_tag(id, tag_id);
        }
    }

    /// The open conversation's id and one of its flags, if it is loaded
    fn open_conversation(
        &self,
        flag: impl Fn(&crate::models::Conversation) -> bool,
    ) -> Option<(ConversationId, bool)> {
        let selected = self.selected.as_ref()?;
        let current = self.store.current_conversation()?;
        if &current.conversation.id != selected {
            return None;
        }
        Some((selected.clone(), flag(&current.conversation)))
    }
}
