//! Chat crate - Business logic for the chatbot admin dashboard
//!
//! This crate provides platform-independent dashboard functionality including:
//! - Domain models (Conversation, Message, Tag, ChatbotConfig)
//! - Backend gateway traits with REST and in-memory implementations
//! - Conversation store (cached lists, filters, mutations)
//! - Live message updates for the open conversation and the widget socket
//! - Chatbot settings and domain verification requests
//! - Widget embed code and preview handshake
//! - Local preferences and headless views
//!
//! This crate has zero UI dependencies and performs blocking I/O only through
//! the gateway it is given.

pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod preferences;
pub mod realtime;
pub mod store;
pub mod views;
pub mod widget;

pub use self::config::BackendCredentials;
pub use error::{AuthRequiredError, BackendError, InvalidInputError, NotFoundError, is_auth_required};
pub use gateway::{
    AuthProvider, ChangeFeed, Filter, InMemoryBackend, PollingFeed, Query, RestGateway, Row,
    RowGateway, Subscription, Table,
};
pub use models::{
    ChatbotConfig, ChatbotConfigUpdate, Conversation, ConversationId, ConversationStatus,
    ConversationUpdate, ConversationWithTags, DomainVerification, Message, MessageId, SenderType,
    Tag, TagId, User, UserId,
};
pub use preferences::{PreferenceStore, Preferences, SelectedDomain};
pub use realtime::{ChatbotSocket, Invalidation, LiveBinding, SubscriptionManager};
pub use store::{ActiveFilter, ConversationStore, LogNotifier, Notifier, SortOrder, StoreState};
