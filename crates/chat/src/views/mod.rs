//! Headless views
//!
//! Each view owns the transient UI state of one dashboard page and turns its
//! controls into store, api and preference calls. Rendering is left to the host.

mod domain_settings;
mod inbox;
mod knowledge_base;

pub use domain_settings::{ChatbotDraft, Clipboard, DomainSettingsView};
pub use inbox::{ConversationRow, InboxView, MessageLine};
pub use knowledge_base::{FaqEntry, KnowledgeBase, TrainingEntry};
