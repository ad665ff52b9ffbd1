//! Chatbot configuration and widget tokens

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use log::info;
use serde_json::{Value, json};

use crate::error::{BackendError, NotFoundError};
use crate::gateway::{Query, RowGateway, Table, select_optional, to_row};
use crate::models::{ChatbotConfig, ChatbotConfigUpdate, UserId};

/// Load the user's chatbot configuration
pub fn fetch_chatbot_config(gateway: &dyn RowGateway, user_id: &UserId) -> Result<ChatbotConfig> {
    select_optional(
        gateway,
        &Query::table(Table::ChatbotConfigs).eq("user_id", user_id.as_str()),
    )?
    .ok_or_else(|| {
        NotFoundError {
            resource: format!("chatbot config for {}", user_id.as_str()),
        }
        .into()
    })
}

/// Write the set fields of `update`, creating the configuration if needed
pub fn update_chatbot_settings(
    gateway: &dyn RowGateway,
    user_id: &UserId,
    update: &ChatbotConfigUpdate,
) -> Result<()> {
    let mut row = to_row(update)?;
    row.insert("user_id".to_string(), Value::String(user_id.as_str().to_string()));
    row.insert(
        "updated_at".to_string(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
    );

    gateway
        .upsert(Table::ChatbotConfigs, row, &["user_id"])
        .context("Failed to save chatbot settings")?;
    info!("Saved chatbot settings for {}", user_id.as_str());
    Ok(())
}

/// Ask the backend to mint a widget authentication token for the user
pub fn generate_chatbot_token(gateway: &dyn RowGateway, user_id: &UserId) -> Result<String> {
    let value = gateway.rpc("generate_chatbot_token", json!({ "user_id": user_id.as_str() }))?;
    match value {
        Value::String(token) => Ok(token),
        other => Err(BackendError::new(format!("Unexpected token response: {}", other)).into()),
    }
}
