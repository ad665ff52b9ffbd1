//! Domain models for dashboard entities

mod chatbot_config;
mod conversation;
mod domain;
mod message;
mod tag;
mod user;

pub use chatbot_config::{
    ChatbotConfig, ChatbotConfigUpdate, DEFAULT_CHATBOT_NAME, DEFAULT_PRIMARY_COLOR,
    DEFAULT_SECONDARY_COLOR, DEFAULT_WELCOME_MESSAGE, OperatingHours, WidgetPosition,
};
pub use conversation::{
    Conversation, ConversationId, ConversationStatus, ConversationUpdate, NewConversation,
};
pub use domain::DomainVerification;
pub use message::{Message, MessageId, NewMessage, SenderType};
pub use tag::{ConversationTag, ConversationWithTags, NewTag, Tag, TagId};
pub use user::{User, UserId};
