//! Conversation store
//!
//! Client-side cache of conversations, messages and tags. Every action does
//! one backend round trip and then re-reads the collections it affected;
//! nothing is updated optimistically.
//!
//! All actions share one `is_loading` flag and one `error` slot. Failures are
//! recorded, surfaced through the [`Notifier`] and swallowed, except in
//! [`ConversationStore::create_conversation`], which also returns them.

use anyhow::{Result, anyhow};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use super::{ActiveFilter, Notifier, SortOrder, StoreState};
use crate::error::{AuthRequiredError, InvalidInputError, NotFoundError};
use crate::gateway::{
    AuthProvider, Filter, Query, RowGateway, Subscription, Table, from_row, select_as,
    select_optional, to_row,
};
use crate::models::{
    Conversation, ConversationId, ConversationTag, ConversationUpdate, ConversationWithTags,
    Message, NewConversation, NewMessage, NewTag, SenderType, Tag, TagId, User,
};

type StateObserver = Arc<dyn Fn(&StoreState) + Send + Sync>;
type Observers = HashMap<u64, StateObserver>;

/// Clears the shared loading flag when an action finishes, however it exits
struct LoadingGuard<'a> {
    store: &'a ConversationStore,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.store.update(|s| s.is_loading = false);
    }
}

/// Shared cache mediating between views and the backend
pub struct ConversationStore {
    gateway: Arc<dyn RowGateway>,
    auth: Arc<dyn AuthProvider>,
    notifier: Arc<dyn Notifier>,
    state: RwLock<StoreState>,
    observers: Arc<RwLock<Observers>>,
    next_observer_id: AtomicU64,
}

impl ConversationStore {
    /// Create a store with empty caches and default list criteria
    pub fn new(
        gateway: Arc<dyn RowGateway>,
        auth: Arc<dyn AuthProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            gateway,
            auth,
            notifier,
            state: RwLock::new(StoreState::default()),
            observers: Arc::new(RwLock::new(HashMap::new())),
            next_observer_id: AtomicU64::new(1),
        }
    }

    // === State access ===

    /// Snapshot of the current state
    pub fn state(&self) -> StoreState {
        self.state.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().map(|s| s.is_loading).unwrap_or(false)
    }

    pub fn error(&self) -> Option<String> {
        self.state.read().ok().and_then(|s| s.error.clone())
    }

    pub fn conversations(&self) -> Vec<ConversationWithTags> {
        self.state.read().map(|s| s.conversations.clone()).unwrap_or_default()
    }

    pub fn current_conversation(&self) -> Option<ConversationWithTags> {
        self.state.read().ok().and_then(|s| s.current_conversation.clone())
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.read().map(|s| s.messages.clone()).unwrap_or_default()
    }

    pub fn tags(&self) -> Vec<Tag> {
        self.state.read().map(|s| s.tags.clone()).unwrap_or_default()
    }

    /// Register a callback run after every state change.
    ///
    /// Observers run on the thread that changed the state and must not call
    /// back into store actions.
    pub fn observe(&self, observer: impl Fn(&StoreState) + Send + Sync + 'static) -> Subscription {
        let id = self.next_observer_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut observers) = self.observers.write() {
            observers.insert(id, Arc::new(observer));
        }
        let observers: Weak<RwLock<Observers>> = Arc::downgrade(&self.observers);
        Subscription::new(move || {
            if let Some(observers) = observers.upgrade()
                && let Ok(mut guard) = observers.write()
            {
                guard.remove(&id);
            }
        })
    }

    // === Queries ===

    /// Re-read the conversation list under the current filter, sort and tag selection
    pub fn fetch_conversations(&self) {
        let _loading = self.begin();
        self.refresh_conversations();
    }

    /// Load a conversation, its tags and all of its messages as the open conversation
    pub fn fetch_messages(&self, conversation_id: &ConversationId) {
        let _loading = self.begin();
        self.refresh_messages(conversation_id);
    }

    /// Re-read the tag vocabulary
    pub fn fetch_tags(&self) {
        let _loading = self.begin();
        self.refresh_tags();
    }

    // === Mutations ===

    /// Append a user message, bump the conversation's activity time, then reload its messages
    pub fn send_message(&self, content: &str, conversation_id: &ConversationId) {
        let _loading = self.begin();
        if let Err(e) = self.try_send_message(content, conversation_id) {
            self.fail(&e, "Failed to send message");
        }
    }

    /// Create a conversation owned by the current user and return its id.
    ///
    /// Unlike the other actions the error is returned after being recorded,
    /// so callers can decide what to do next.
    pub fn create_conversation(&self, title: Option<&str>) -> Result<ConversationId> {
        let _loading = self.begin();
        match self.try_create_conversation(title) {
            Ok(id) => Ok(id),
            Err(e) => {
                self.fail(&e, "Failed to create conversation");
                error!("Conversation creation failed: {:#}", e);
                Err(e)
            }
        }
    }

    /// Apply a partial update, then reload the conversation list
    pub fn update_conversation(&self, id: &ConversationId, update: ConversationUpdate) {
        let _loading = self.begin();
        if let Err(e) = self.try_update_conversation(id, update) {
            self.fail(&e, "Failed to update conversation");
        }
    }

    /// Attach a tag to a conversation. Attaching an attached tag is a no-op.
    pub fn add_tag(&self, conversation_id: &ConversationId, tag_id: &TagId) {
        let _loading = self.begin();
        let link = ConversationTag {
            conversation_id: conversation_id.clone(),
            tag_id: tag_id.clone(),
        };
        let result = to_row(&link).and_then(|row| {
            self.gateway
                .upsert(Table::ConversationTags, row, &["conversation_id", "tag_id"])
        });
        match result {
            Ok(_) => {
                info!("Tagged conversation {} with {}", conversation_id.as_str(), tag_id.as_str());
                self.notifier.success("Tag added successfully");
                self.refresh_messages(conversation_id);
                self.refresh_conversations();
            }
            Err(e) => self.fail(&e, "Failed to add tag"),
        }
    }

    /// Detach a tag from a conversation. Detaching an absent tag is a no-op.
    pub fn remove_tag(&self, conversation_id: &ConversationId, tag_id: &TagId) {
        let _loading = self.begin();
        let filters = [
            Filter::eq("conversation_id", conversation_id.as_str()),
            Filter::eq("tag_id", tag_id.as_str()),
        ];
        match self.gateway.delete(Table::ConversationTags, &filters) {
            Ok(removed) => {
                info!(
                    "Removed tag {} from conversation {} ({} row(s))",
                    tag_id.as_str(),
                    conversation_id.as_str(),
                    removed
                );
                self.notifier.success("Tag removed successfully");
                self.refresh_messages(conversation_id);
                self.refresh_conversations();
            }
            Err(e) => self.fail(&e, "Failed to remove tag"),
        }
    }

    /// Add a tag to the global vocabulary
    pub fn create_tag(&self, name: &str, color: &str) {
        let _loading = self.begin();
        match self.try_create_tag(name, color) {
            Ok(tag) => {
                info!("Created tag {} ({})", tag.name, tag.id.as_str());
                self.notifier.success("Tag created successfully");
                self.refresh_tags();
            }
            Err(e) => self.fail(&e, "Failed to create tag"),
        }
    }

    /// Remove a tag from the vocabulary and, through the join, from every conversation
    pub fn delete_tag(&self, tag_id: &TagId) {
        let _loading = self.begin();
        match self.gateway.delete(Table::Tags, &[Filter::eq("id", tag_id.as_str())]) {
            Ok(_) => {
                info!("Deleted tag {}", tag_id.as_str());
                self.update(|s| s.selected_tags.retain(|t| t != tag_id));
                self.notifier.success("Tag deleted successfully");
                self.refresh_tags();
                self.refresh_conversations();
                if let Some(current) = self.current_conversation() {
                    self.refresh_messages(&current.conversation.id);
                }
            }
            Err(e) => self.fail(&e, "Failed to delete tag"),
        }
    }

    // === List criteria (each change re-queries) ===

    pub fn set_sort_order(&self, order: SortOrder) {
        self.update(|s| s.sort_order = order);
        self.fetch_conversations();
    }

    pub fn set_active_filter(&self, filter: ActiveFilter) {
        self.update(|s| s.active_filter = filter);
        self.fetch_conversations();
    }

    pub fn set_selected_tags(&self, tags: Vec<TagId>) {
        self.update(|s| s.selected_tags = tags);
        self.fetch_conversations();
    }

    /// Add the tag to the selection, or remove it if already selected
    pub fn toggle_selected_tag(&self, tag_id: &TagId) {
        self.update(|s| {
            if let Some(pos) = s.selected_tags.iter().position(|t| t == tag_id) {
                s.selected_tags.remove(pos);
            } else {
                s.selected_tags.push(tag_id.clone());
            }
        });
        self.fetch_conversations();
    }

    // === Internals ===

    fn begin(&self) -> LoadingGuard<'_> {
        self.update(|s| {
            s.is_loading = true;
            s.error = None;
        });
        LoadingGuard { store: self }
    }

    fn fail(&self, err: &anyhow::Error, notification: &str) {
        warn!("{}: {:#}", notification, err);
        let message = err.to_string();
        self.update(|s| s.error = Some(message));
        self.notifier.error(notification);
    }

    fn update(&self, f: impl FnOnce(&mut StoreState)) {
        let snapshot = match self.state.write() {
            Ok(mut state) => {
                f(&mut state);
                state.clone()
            }
            Err(_) => return,
        };
        self.notify(&snapshot);
    }

    fn notify(&self, snapshot: &StoreState) {
        let observers: Vec<StateObserver> = match self.observers.read() {
            Ok(observers) => observers.values().cloned().collect(),
            Err(_) => return,
        };
        for observer in observers {
            observer(snapshot);
        }
    }

    fn require_user(&self) -> Result<User> {
        self.auth.current_user()?.ok_or_else(|| AuthRequiredError.into())
    }

    fn refresh_conversations(&self) {
        if let Err(e) = self.load_conversations() {
            self.fail(&e, "Failed to fetch conversations");
        }
    }

    fn refresh_messages(&self, conversation_id: &ConversationId) {
        if let Err(e) = self.load_messages(conversation_id) {
            self.fail(&e, "Failed to fetch messages");
        }
    }

    fn refresh_tags(&self) {
        if let Err(e) = self.load_tags() {
            self.fail(&e, "Failed to fetch tags");
        }
    }

    fn load_conversations(&self) -> Result<()> {
        let (filter, sort, selected) = {
            let state = self.state.read().map_err(|_| anyhow!("store state lock poisoned"))?;
            (state.active_filter, state.sort_order, state.selected_tags.clone())
        };

        let query = filter
            .apply(Query::table(Table::Conversations))
            .order_by("last_message_at", sort.ascending());
        let conversations: Vec<Conversation> = select_as(self.gateway.as_ref(), &query)?;
        let mut items = self.join_tags(conversations)?;

        // Tag selection is a client-side superset filter
        if !selected.is_empty() {
            items.retain(|c| c.has_all_tags(&selected));
        }

        debug!(
            "Loaded {} conversation(s) (filter={}, sort={:?}, tags={})",
            items.len(),
            filter,
            sort,
            selected.len()
        );
        self.update(|s| s.conversations = items);
        Ok(())
    }

    fn load_messages(&self, conversation_id: &ConversationId) -> Result<()> {
        let gateway = self.gateway.as_ref();

        let messages: Vec<Message> = select_as(
            gateway,
            &Query::table(Table::Messages)
                .eq("conversation_id", conversation_id.as_str())
                .order_by("created_at", true),
        )?;

        let conversation: Conversation = select_optional(
            gateway,
            &Query::table(Table::Conversations).eq("id", conversation_id.as_str()),
        )?
        .ok_or_else(|| NotFoundError {
            resource: format!("conversation {}", conversation_id.as_str()),
        })?;

        let tags = self
            .join_tags(vec![conversation])?
            .pop()
            .ok_or_else(|| anyhow!("tag join dropped conversation {}", conversation_id.as_str()))?;

        debug!("Loaded {} message(s) for {}", messages.len(), conversation_id.as_str());
        self.update(|s| {
            s.messages = messages;
            s.current_conversation = Some(tags);
        });
        Ok(())
    }

    fn load_tags(&self) -> Result<()> {
        let tags: Vec<Tag> = select_as(
            self.gateway.as_ref(),
            &Query::table(Table::Tags).order_by("name", true),
        )?;
        self.update(|s| s.tags = tags);
        Ok(())
    }

    /// Reconstruct each conversation's tag set through the join table
    fn join_tags(&self, conversations: Vec<Conversation>) -> Result<Vec<ConversationWithTags>> {
        if conversations.is_empty() {
            return Ok(Vec::new());
        }
        let gateway = self.gateway.as_ref();

        let ids: Vec<&str> = conversations.iter().map(|c| c.id.as_str()).collect();
        let links: Vec<ConversationTag> = select_as(
            gateway,
            &Query::table(Table::ConversationTags).filter(Filter::is_in("conversation_id", ids)),
        )?;

        let tag_ids: HashSet<&str> = links.iter().map(|l| l.tag_id.as_str()).collect();
        let tags: HashMap<TagId, Tag> = if tag_ids.is_empty() {
            HashMap::new()
        } else {
            let tags: Vec<Tag> = select_as(
                gateway,
                &Query::table(Table::Tags)
                    .filter(Filter::is_in("id", tag_ids))
                    .order_by("name", true),
            )?;
            tags.into_iter().map(|t| (t.id.clone(), t)).collect()
        };

        let mut by_conversation: HashMap<&ConversationId, Vec<Tag>> = HashMap::new();
        for link in &links {
            // A link whose tag vanished between the two reads is skipped
            if let Some(tag) = tags.get(&link.tag_id) {
                by_conversation
                    .entry(&link.conversation_id)
                    .or_default()
                    .push(tag.clone());
            }
        }
        for tags in by_conversation.values_mut() {
            tags.sort_by(|a, b| a.name.cmp(&b.name));
        }

        let result = conversations
            .iter()
            .map(|c| ConversationWithTags {
                conversation: c.clone(),
                tags: by_conversation.get(&c.id).cloned().unwrap_or_default(),
            })
            .collect();
        Ok(result)
    }

    fn try_send_message(&self, content: &str, conversation_id: &ConversationId) -> Result<()> {
        let user = self.require_user()?;

        let message = NewMessage {
            conversation_id: conversation_id.clone(),
            content: content.to_string(),
            sender_type: SenderType::User,
            user_id: Some(user.id),
        };
        self.gateway.insert(Table::Messages, to_row(&message)?)?;

        // Not transactional: a failure here leaves the list ordering stale
        let touch = ConversationUpdate::new().touched_at(Utc::now());
        self.gateway.update(
            Table::Conversations,
            &[Filter::eq("id", conversation_id.as_str())],
            to_row(&touch)?,
        )?;

        info!("Sent message to conversation {}", conversation_id.as_str());
        self.refresh_messages(conversation_id);
        Ok(())
    }

    fn try_create_conversation(&self, title: Option<&str>) -> Result<ConversationId> {
        let user = self.require_user()?;

        let new = NewConversation::new(user.id, title.map(str::to_string));
        let row = self.gateway.insert(Table::Conversations, to_row(&new)?)?;
        let conversation: Conversation = from_row(Table::Conversations, row)?;

        info!("Created conversation {}", conversation.id.as_str());
        self.refresh_conversations();
        Ok(conversation.id)
    }

    fn try_update_conversation(&self, id: &ConversationId, update: ConversationUpdate) -> Result<()> {
        self.gateway
            .update(Table::Conversations, &[Filter::eq("id", id.as_str())], to_row(&update)?)?;
        info!("Updated conversation {}", id.as_str());

        self.refresh_conversations();
        let is_current = self
            .current_conversation()
            .is_some_and(|c| &c.conversation.id == id);
        if is_current {
            self.refresh_messages(id);
        }
        Ok(())
    }

    fn try_create_tag(&self, name: &str, color: &str) -> Result<Tag> {
        let name = name.trim();
        if name.is_empty() {
            return Err(InvalidInputError::new("Tag name cannot be empty").into());
        }
        let new = NewTag {
            name: name.to_string(),
            color: color.to_string(),
        };
        let row = self.gateway.insert(Table::Tags, to_row(&new)?)?;
        from_row(Table::Tags, row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BackendError, is_auth_required};
    use crate::gateway::InMemoryBackend;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        successes: Mutex<Vec<String>>,
        errors: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn success(&self, message: &str) {
            self.successes.lock().unwrap().push(message.to_string());
        }

        fn error(&self, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }
    }

    fn setup() -> (Arc<InMemoryBackend>, Arc<RecordingNotifier>, ConversationStore) {
        let backend = Arc::new(InMemoryBackend::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let store = ConversationStore::new(backend.clone(), backend.clone(), notifier.clone());
        (backend, notifier, store)
    }

    fn seed_conversation(backend: &InMemoryBackend, id: &str, starred: bool, at: &str) {
        backend
            .seed(
                Table::Conversations,
                json!({
                    "id": id,
                    "status": "active",
                    "is_read": false,
                    "is_starred": starred,
                    "last_message_at": at,
                    "created_at": at,
                }),
            )
            .unwrap();
    }

    fn ids(store: &ConversationStore) -> Vec<String> {
        store
            .conversations()
            .iter()
            .map(|c| c.conversation.id.as_str().to_string())
            .collect()
    }

    #[test]
    fn test_fetch_conversations_sorted_newest_first() {
        let (backend, _, store) = setup();
        seed_conversation(&backend, "old", false, "2024-01-01T00:00:00Z");
        seed_conversation(&backend, "new", false, "2024-03-01T00:00:00Z");
        seed_conversation(&backend, "mid", false, "2024-02-01T00:00:00Z");

        store.fetch_conversations();
        assert_eq!(ids(&store), vec!["new", "mid", "old"]);

        store.set_sort_order(SortOrder::Oldest);
        assert_eq!(ids(&store), vec!["old", "mid", "new"]);
    }

    #[test]
    fn test_deleted_conversations_are_hidden() {
        let (backend, _, store) = setup();
        seed_conversation(&backend, "c1", false, "2024-01-01T00:00:00Z");
        seed_conversation(&backend, "c2", false, "2024-01-02T00:00:00Z");

        store.update_conversation(
            &ConversationId::new("c2"),
            ConversationUpdate::new().status(crate::models::ConversationStatus::Deleted),
        );
        assert_eq!(ids(&store), vec!["c1"]);
        assert_eq!(backend.rows(Table::Conversations).len(), 2);
    }

    #[test]
    fn test_loading_flag_cleared_and_error_recorded() {
        let (backend, notifier, store) = setup();
        backend.fail_next(Table::Conversations, "permission denied for table conversations");

        store.fetch_conversations();

        let state = store.state();
        assert!(!state.is_loading);
        assert_eq!(state.error.as_deref(), Some("permission denied for table conversations"));
        assert_eq!(
            notifier.errors.lock().unwrap().as_slice(),
            ["Failed to fetch conversations".to_string()]
        );

        // The next action clears the error
        store.fetch_conversations();
        assert!(store.error().is_none());
    }

    #[test]
    fn test_loading_flag_visible_to_observers() {
        let (backend, _, store) = setup();
        seed_conversation(&backend, "c1", false, "2024-01-01T00:00:00Z");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = store.observe(move |s| sink.lock().unwrap().push(s.is_loading));

        store.fetch_conversations();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.first(), Some(&true));
        assert_eq!(seen.last(), Some(&false));
    }

    #[test]
    fn test_send_message_requires_auth() {
        let (backend, notifier, store) = setup();
        seed_conversation(&backend, "c1", false, "2024-01-01T00:00:00Z");

        store.send_message("hello", &ConversationId::new("c1"));

        assert_eq!(store.error().as_deref(), Some("User not authenticated"));
        assert!(backend.rows(Table::Messages).is_empty());
        assert_eq!(
            notifier.errors.lock().unwrap().as_slice(),
            ["Failed to send message".to_string()]
        );
    }

    #[test]
    fn test_create_conversation_reraises() {
        let (backend, _, store) = setup();

        let err = store.create_conversation(Some("Hi")).unwrap_err();
        assert!(is_auth_required(&err));
        assert_eq!(store.error().as_deref(), Some("User not authenticated"));
        assert!(backend.rows(Table::Conversations).is_empty());
        assert!(!store.is_loading());
    }

    #[test]
    fn test_create_conversation_backend_error_is_returned() {
        let (backend, notifier, store) = setup();
        backend.sign_in(User::new("u1"));
        backend.fail_next(Table::Conversations, "new row violates row-level security policy");

        let err = store.create_conversation(Some("Hi")).unwrap_err();
        assert!(err.downcast_ref::<BackendError>().is_some());
        assert!(!is_auth_required(&err));
        assert_eq!(
            store.error().as_deref(),
            Some("new row violates row-level security policy")
        );
        assert_eq!(
            notifier.errors.lock().unwrap().as_slice(),
            ["Failed to create conversation".to_string()]
        );
        assert!(backend.rows(Table::Conversations).is_empty());
        assert_eq!(backend.read_count(Table::Conversations), 0);
        assert!(!store.is_loading());
    }

    #[test]
    fn test_send_message_keeps_message_when_touch_fails() {
        let (backend, notifier, store) = setup();
        backend.sign_in(User::new("agent"));
        seed_conversation(&backend, "c1", false, "2024-01-01T00:00:00Z");
        let c1 = ConversationId::new("c1");
        store.fetch_messages(&c1);
        let reads_before = backend.read_count(Table::Messages);

        // The message insert goes through; the activity-time update is rejected
        backend.fail_next(Table::Conversations, "statement timeout");
        store.send_message("hello", &c1);

        let stored = backend.rows(Table::Messages);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["content"], "hello");
        assert_eq!(
            backend.rows(Table::Conversations)[0]["last_message_at"],
            "2024-01-01T00:00:00Z"
        );
        assert_eq!(store.error().as_deref(), Some("statement timeout"));
        assert_eq!(
            notifier.errors.lock().unwrap().as_slice(),
            ["Failed to send message".to_string()]
        );
        assert!(!store.is_loading());

        // No reload after the failed step
        assert_eq!(backend.read_count(Table::Messages), reads_before);
        assert!(store.messages().is_empty());
    }

    #[test]
    fn test_rejected_tag_writes_skip_refresh() {
        let (backend, notifier, store) = setup();
        seed_conversation(&backend, "c1", false, "2024-01-01T00:00:00Z");
        backend.seed(Table::Tags, json!({ "id": "t1", "name": "urgent", "color": "red" })).unwrap();
        let c1 = ConversationId::new("c1");
        let t1 = TagId::new("t1");

        backend.fail_next(Table::ConversationTags, "permission denied for table conversation_tags");
        store.add_tag(&c1, &t1);

        assert!(backend.rows(Table::ConversationTags).is_empty());
        assert_eq!(
            store.error().as_deref(),
            Some("permission denied for table conversation_tags")
        );
        assert_eq!(backend.read_count(Table::Conversations), 0);
        assert_eq!(backend.read_count(Table::Messages), 0);

        store.add_tag(&c1, &t1);
        assert!(store.error().is_none());
        assert_eq!(backend.rows(Table::ConversationTags).len(), 1);
        let reads_before = (
            backend.read_count(Table::Conversations),
            backend.read_count(Table::Messages),
        );

        backend.fail_next(Table::ConversationTags, "permission denied for table conversation_tags");
        store.remove_tag(&c1, &t1);

        assert_eq!(backend.rows(Table::ConversationTags).len(), 1);
        assert!(store.error().is_some());
        assert_eq!(
            (
                backend.read_count(Table::Conversations),
                backend.read_count(Table::Messages)
            ),
            reads_before
        );
        assert_eq!(
            notifier.errors.lock().unwrap().as_slice(),
            ["Failed to add tag".to_string(), "Failed to remove tag".to_string()]
        );
        assert_eq!(
            notifier.successes.lock().unwrap().as_slice(),
            ["Tag added successfully".to_string()]
        );
    }

    #[test]
    fn test_rejected_update_skips_refresh() {
        let (backend, notifier, store) = setup();
        seed_conversation(&backend, "c1", false, "2024-01-01T00:00:00Z");
        let c1 = ConversationId::new("c1");
        store.fetch_messages(&c1);
        store.fetch_conversations();
        let reads_before = (
            backend.read_count(Table::Conversations),
            backend.read_count(Table::Messages),
        );

        backend.fail_next(Table::Conversations, "permission denied for table conversations");
        store.update_conversation(&c1, ConversationUpdate::new().starred(true));

        assert_eq!(backend.rows(Table::Conversations)[0]["is_starred"], false);
        assert_eq!(
            store.error().as_deref(),
            Some("permission denied for table conversations")
        );
        assert_eq!(
            notifier.errors.lock().unwrap().as_slice(),
            ["Failed to update conversation".to_string()]
        );
        assert_eq!(
            (
                backend.read_count(Table::Conversations),
                backend.read_count(Table::Messages)
            ),
            reads_before
        );
        assert!(!store.conversations()[0].conversation.is_starred);
        assert!(!store.is_loading());
    }

    #[test]
    fn test_create_conversation_returns_id_and_refreshes() {
        let (backend, _, store) = setup();
        backend.sign_in(User::new("u1"));

        let id = store.create_conversation(None).unwrap();

        let list = store.conversations();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].conversation.id, id);
        assert_eq!(list[0].conversation.display_title(), "New Conversation");
        assert_eq!(
            list[0].conversation.user_id.as_ref().map(|u| u.as_str()),
            Some("u1")
        );
    }

    #[test]
    fn test_fetch_messages_missing_conversation() {
        let (_, _, store) = setup();
        store.fetch_messages(&ConversationId::new("ghost"));
        assert_eq!(store.error().as_deref(), Some("Not found: conversation ghost"));
        assert!(store.current_conversation().is_none());
    }

    #[test]
    fn test_create_tag_validates_and_refreshes() {
        let (_, notifier, store) = setup();

        store.create_tag("   ", "red");
        assert_eq!(store.error().as_deref(), Some("Tag name cannot be empty"));

        store.create_tag("vip", "gold");
        store.create_tag("billing", "blue");
        let names: Vec<_> = store.tags().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["billing", "vip"]);
        assert_eq!(notifier.successes.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_delete_tag_drops_it_from_selection() {
        let (backend, _, store) = setup();
        backend.seed(Table::Tags, json!({ "id": "t1", "name": "urgent", "color": "red" })).unwrap();
        seed_conversation(&backend, "c1", false, "2024-01-01T00:00:00Z");

        store.set_selected_tags(vec![TagId::new("t1")]);
        assert!(store.conversations().is_empty());

        store.delete_tag(&TagId::new("t1"));
        let state = store.state();
        assert!(state.selected_tags.is_empty());
        assert_eq!(state.conversations.len(), 1);
        assert!(state.tags.is_empty());
    }

    #[test]
    fn test_toggle_selected_tag() {
        let (_, _, store) = setup();
        let tag = TagId::new("t1");
        store.toggle_selected_tag(&tag);
        assert_eq!(store.state().selected_tags, vec![tag.clone()]);
        store.toggle_selected_tag(&tag);
        assert!(store.state().selected_tags.is_empty());
    }

    #[test]
    fn test_observer_cancel_stops_notifications() {
        let (_, _, store) = setup();
        let count = Arc::new(Mutex::new(0));
        let sink = count.clone();
        let sub = store.observe(move |_| *sink.lock().unwrap() += 1);

        store.fetch_tags();
        let after_first = *count.lock().unwrap();
        assert!(after_first > 0);

        sub.cancel();
        store.fetch_tags();
        assert_eq!(*count.lock().unwrap(), after_first);
    }
}
