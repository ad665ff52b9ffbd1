//! Listener lifecycle for the open conversation

use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};

use super::LiveBinding;
use crate::gateway::{ChangeCallback, ChangeFeed, Subscription};
use crate::models::ConversationId;
use crate::store::ConversationStore;

struct OpenConversation {
    id: ConversationId,
    subscription: Subscription,
}

/// Keeps at most one live listener, bound to the open conversation
///
/// Switching conversations cancels the previous listener before the next is
/// registered, so each inserted message triggers exactly one reload.
pub struct SubscriptionManager {
    feed: Arc<dyn ChangeFeed>,
    store: Arc<ConversationStore>,
    open: Mutex<Option<OpenConversation>>,
}

impl SubscriptionManager {
    pub fn new(feed: Arc<dyn ChangeFeed>, store: Arc<ConversationStore>) -> Self {
        Self {
            feed,
            store,
            open: Mutex::new(None),
        }
    }

    /// Open a conversation: load it and keep it live.
    ///
    /// Re-opening the conversation that is already open only reloads it.
    pub fn open(&self, conversation_id: &ConversationId) -> Result<()> {
        let mut open = self
            .open
            .lock()
            .map_err(|_| anyhow!("subscription state lock poisoned"))?;

        if open.as_ref().is_some_and(|o| &o.id == conversation_id) {
            self.store.fetch_messages(conversation_id);
            return Ok(());
        }

        if let Some(previous) = open.take() {
            previous.subscription.cancel();
            debug!("Stopped listening to {}", previous.id.as_str());
        }

        self.store.fetch_messages(conversation_id);

        let binding = LiveBinding::messages(conversation_id);
        let store = Arc::downgrade(&self.store);
        let invalidation = binding.invalidates.clone();
        let callback: ChangeCallback = Arc::new(move |_row| {
            if let Some(store) = store.upgrade() {
                debug!("Change received, reloading {:?}", invalidation);
                invalidation.refresh(&store);
            }
        });

        let subscription = self
            .feed
            .subscribe(binding.subscription, callback)
            .inspect_err(|e| warn!("Failed to listen to {}: {:#}", conversation_id.as_str(), e))?;

        info!("Listening for messages in {}", conversation_id.as_str());
        *open = Some(OpenConversation {
            id: conversation_id.clone(),
            subscription,
        });
        Ok(())
    }

    /// Stop listening. Closing with nothing open does nothing.
    pub fn close(&self) {
        let previous = match self.open.lock() {
            Ok(mut open) => open.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(previous) = previous {
            previous.subscription.cancel();
            info!("Stopped listening to {}", previous.id.as_str());
        }
    }

    /// The conversation currently kept live
    pub fn active_conversation(&self) -> Option<ConversationId> {
        self.open
            .lock()
            .ok()
            .and_then(|o| o.as_ref().map(|o| o.id.clone()))
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.close();
    }
}
