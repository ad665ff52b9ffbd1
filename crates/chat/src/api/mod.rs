//! Account-level backend operations
//!
//! Thin request helpers over a [`crate::gateway::RowGateway`]. Unlike store
//! actions these return every error to the caller.

mod chatbot;
mod domain;

pub use chatbot::{fetch_chatbot_config, generate_chatbot_token, update_chatbot_settings};
pub use domain::{register_domain, verify_domain};
