//! Preview frame message exchange
//!
//! The preview frame announces itself with `{"type":"ready"}` and is answered
//! with `{"type":"config","config":{...}}`. Anything else is ignored.

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::gateway::AuthProvider;
use crate::models::{ChatbotConfig, WidgetPosition};

/// The subset of the chatbot configuration the widget renders with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetAppearance {
    pub primary_color: String,
    pub secondary_color: String,
    pub name: String,
    pub welcome_message: String,
    pub position: WidgetPosition,
}

impl From<&ChatbotConfig> for WidgetAppearance {
    fn from(config: &ChatbotConfig) -> Self {
        Self {
            primary_color: config.primary_color.clone(),
            secondary_color: config.secondary_color.clone(),
            name: config.name.clone(),
            welcome_message: config.welcome_message.clone(),
            position: config.position,
        }
    }
}

/// Configuration pushed to the frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedConfig {
    #[serde(flatten)]
    pub appearance: WidgetAppearance,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Messages exchanged with the preview frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EmbedMessage {
    Ready,
    Config { config: EmbedConfig },
    #[serde(other)]
    Unknown,
}

/// Answers the preview frame's handshake
pub struct EmbedBridge {
    auth: Arc<dyn AuthProvider>,
    appearance: WidgetAppearance,
}

impl EmbedBridge {
    pub fn new(auth: Arc<dyn AuthProvider>, appearance: WidgetAppearance) -> Self {
        Self { auth, appearance }
    }

    /// Replace what the next handshake sends, e.g. after a settings edit
    pub fn set_appearance(&mut self, appearance: WidgetAppearance) {
        self.appearance = appearance;
    }

    /// React to one message from the frame; `Some` is the reply to post back
    pub fn handle(&self, message: &EmbedMessage) -> Result<Option<EmbedMessage>> {
        match message {
            EmbedMessage::Ready => {
                let user_id = self.auth.current_user()?.map(|u| u.id.as_str().to_string());
                debug!("Preview frame ready, sending config");
                Ok(Some(EmbedMessage::Config {
                    config: EmbedConfig {
                        appearance: self.appearance.clone(),
                        user_id,
                    },
                }))
            }
            _ => Ok(None),
        }
    }

    /// Same as [`EmbedBridge::handle`] for raw JSON payloads
    pub fn handle_json(&self, payload: &str) -> Result<Option<String>> {
        let message: EmbedMessage =
            serde_json::from_str(payload).context("Failed to parse frame message")?;
        match self.handle(&message)? {
            Some(reply) => Ok(Some(
                serde_json::to_string(&reply).context("Failed to encode frame reply")?,
            )),
            None => Ok(None),
        }
    }
}
