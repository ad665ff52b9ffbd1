//! Event to invalidation records

use crate::gateway::{ChangeSubscription, Filter, Table};
use crate::models::ConversationId;
use crate::store::ConversationStore;

/// Cached query to reload when a bound event arrives
#[derive(Debug, Clone, PartialEq)]
pub enum Invalidation {
    /// The message list and tag set of one conversation
    Messages(ConversationId),
}

impl Invalidation {
    /// Reload the invalidated data into the store
    pub fn refresh(&self, store: &ConversationStore) {
        match self {
            Invalidation::Messages(id) => store.fetch_messages(id),
        }
    }
}

/// Which change events invalidate which cached query
///
/// The event row itself is never merged; it only signals a reload.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveBinding {
    pub subscription: ChangeSubscription,
    pub invalidates: Invalidation,
}

impl LiveBinding {
    /// Messages inserted into `conversation_id` reload that conversation
    pub fn messages(conversation_id: &ConversationId) -> Self {
        Self {
            subscription: ChangeSubscription::inserts(Table::Messages)
                .with_filter(Filter::eq("conversation_id", conversation_id.as_str())),
            invalidates: Invalidation::Messages(conversation_id.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ChangeEvent;
    use serde_json::json;

    #[test]
    fn test_messages_binding_scope() {
        let binding = LiveBinding::messages(&ConversationId::new("c1"));
        assert_eq!(binding.invalidates, Invalidation::Messages(ConversationId::new("c1")));

        let row = json!({ "conversation_id": "c1", "content": "hi" });
        let row = row.as_object().unwrap();
        assert!(binding.subscription.matches(Table::Messages, ChangeEvent::Insert, row));
        assert!(!binding.subscription.matches(Table::Conversations, ChangeEvent::Insert, row));

        let other = json!({ "conversation_id": "c2" });
        assert!(!binding
            .subscription
            .matches(Table::Messages, ChangeEvent::Insert, other.as_object().unwrap()));
    }
}
