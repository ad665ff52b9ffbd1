//! Chatbot widget configuration (one per account)

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use super::UserId;

/// Widget name shown before the owner picks one
pub const DEFAULT_CHATBOT_NAME: &str = "Friendly Assistant";
pub const DEFAULT_PRIMARY_COLOR: &str = "#FF6B00";
pub const DEFAULT_SECONDARY_COLOR: &str = "#FFFFFF";
pub const DEFAULT_WELCOME_MESSAGE: &str = "👋 Hi there! How can I help you today?";

fn default_name() -> String {
    DEFAULT_CHATBOT_NAME.to_string()
}

fn default_primary_color() -> String {
    DEFAULT_PRIMARY_COLOR.to_string()
}

fn default_secondary_color() -> String {
    DEFAULT_SECONDARY_COLOR.to_string()
}

fn default_welcome_message() -> String {
    DEFAULT_WELCOME_MESSAGE.to_string()
}

/// Which corner of the host page the widget docks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetPosition {
    Left,
    #[default]
    Right,
}

/// Opening window for one weekday
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingHours {
    /// 0 = Sunday .. 6 = Saturday
    pub day: u32,
    /// "HH:MM", 24-hour clock
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub is_closed: bool,
}

impl OperatingHours {
    pub fn new(day: Weekday, start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            day: day.num_days_from_sunday(),
            start: start.into(),
            end: end.into(),
            is_closed: false,
        }
    }

    pub fn closed(day: Weekday) -> Self {
        Self {
            day: day.num_days_from_sunday(),
            start: "00:00".to_string(),
            end: "00:00".to_string(),
            is_closed: true,
        }
    }

    /// Whether `time` falls inside `[start, end)`. Unparseable bounds count as closed.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.is_closed {
            return false;
        }
        let (Ok(start), Ok(end)) = (
            NaiveTime::parse_from_str(&self.start, "%H:%M"),
            NaiveTime::parse_from_str(&self.end, "%H:%M"),
        ) else {
            return false;
        };
        start <= time && time < end
    }
}

/// Presentation and behavior of the embeddable chatbot widget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatbotConfig {
    pub id: String,
    pub user_id: UserId,
    /// Columns a partial first save may leave unset fall back to the widget defaults
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_primary_color")]
    pub primary_color: String,
    #[serde(default = "default_secondary_color")]
    pub secondary_color: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,
    #[serde(default)]
    pub position: WidgetPosition,
    #[serde(default)]
    pub custom_css: Option<String>,
    #[serde(default)]
    pub operating_hours: Vec<OperatingHours>,
    /// Delay before the bot replies, in milliseconds
    #[serde(default)]
    pub response_delay: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatbotConfig {
    /// Whether the widget is staffed at the given weekday and local time.
    ///
    /// An empty schedule means always open; a weekday without an entry is closed.
    pub fn is_open_at(&self, day: Weekday, time: NaiveTime) -> bool {
        if self.operating_hours.is_empty() {
            return true;
        }
        let day = day.num_days_from_sunday();
        self.operating_hours
            .iter()
            .filter(|h| h.day == day)
            .any(|h| h.contains(time))
    }
}

/// Partial update for the chatbot configuration; only set fields are written
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatbotConfigUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub welcome_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<WidgetPosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_css: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operating_hours: Option<Vec<OperatingHours>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_delay: Option<u32>,
}
