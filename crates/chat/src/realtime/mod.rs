//! Live message updates
//!
//! Keeps the open conversation's message list current by listening for
//! inserted messages and re-reading the conversation on each one. The widget
//! socket instead hands each inserted message to its caller.

mod binding;
mod manager;
mod socket;

pub use binding::{Invalidation, LiveBinding};
pub use manager::SubscriptionManager;
pub use socket::ChatbotSocket;
