//! Client-side state store
//!
//! Holds the cached collections views render and exposes the actions that
//! mutate the backend and refresh them.

mod conversation_store;
mod notifier;
mod state;

pub use conversation_store::ConversationStore;
pub use notifier::{LogNotifier, Notifier};
pub use state::{ActiveFilter, SortOrder, StoreState};
