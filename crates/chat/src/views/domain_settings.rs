//! Domain settings view - domain name, embed code and chatbot appearance

use anyhow::Result;
use log::{info, warn};
use std::sync::Arc;

use crate::api::update_chatbot_settings;
use crate::error::AuthRequiredError;
use crate::gateway::{AuthProvider, RowGateway};
use crate::models::{
    ChatbotConfigUpdate, DEFAULT_CHATBOT_NAME, DEFAULT_PRIMARY_COLOR, DEFAULT_SECONDARY_COLOR,
    DEFAULT_WELCOME_MESSAGE, WidgetPosition,
};
use crate::preferences::PreferenceStore;
use crate::store::Notifier;
use crate::widget::{
    DEFAULT_LOADER_BASE, DEFAULT_WIDGET_BASE, WidgetAppearance, integration_snippet, script_tag,
    validate_domain_name,
};

/// Trait for writing text to the system clipboard
pub trait Clipboard: Send + Sync {
    fn write_text(&self, text: &str) -> Result<()>;
}

/// Unsaved chatbot appearance edits
#[derive(Debug, Clone, PartialEq)]
pub struct ChatbotDraft {
    pub name: String,
    pub color: String,
    pub welcome_message: String,
}

impl Default for ChatbotDraft {
    fn default() -> Self {
        Self {
            name: DEFAULT_CHATBOT_NAME.to_string(),
            color: DEFAULT_PRIMARY_COLOR.to_string(),
            welcome_message: DEFAULT_WELCOME_MESSAGE.to_string(),
        }
    }
}

impl ChatbotDraft {
    pub fn to_update(&self) -> ChatbotConfigUpdate {
        ChatbotConfigUpdate {
            name: Some(self.name.clone()),
            primary_color: Some(self.color.clone()),
            welcome_message: Some(self.welcome_message.clone()),
            ..Default::default()
        }
    }

    /// What the live preview renders with
    pub fn appearance(&self) -> WidgetAppearance {
        WidgetAppearance {
            primary_color: self.color.clone(),
            secondary_color: DEFAULT_SECONDARY_COLOR.to_string(),
            name: self.name.clone(),
            welcome_message: self.welcome_message.clone(),
            position: WidgetPosition::Right,
        }
    }
}

/// Headless domain settings page
pub struct DomainSettingsView {
    gateway: Arc<dyn RowGateway>,
    auth: Arc<dyn AuthProvider>,
    preferences: Arc<PreferenceStore>,
    clipboard: Arc<dyn Clipboard>,
    notifier: Arc<dyn Notifier>,
    domain_input: String,
    is_editing: bool,
    copied: bool,
    pub draft: ChatbotDraft,
}

impl DomainSettingsView {
    pub fn new(
        gateway: Arc<dyn RowGateway>,
        auth: Arc<dyn AuthProvider>,
        preferences: Arc<PreferenceStore>,
        clipboard: Arc<dyn Clipboard>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let domain_input = preferences.selected_domain().name;
        Self {
            gateway,
            auth,
            preferences,
            clipboard,
            notifier,
            domain_input,
            is_editing: false,
            copied: false,
            draft: ChatbotDraft::default(),
        }
    }

    /// The saved domain name
    pub fn domain_name(&self) -> String {
        self.preferences.selected_domain().name
    }

    pub fn domain_input(&self) -> &str {
        &self.domain_input
    }

    pub fn is_editing(&self) -> bool {
        self.is_editing
    }

    pub fn start_editing(&mut self) {
        self.is_editing = true;
    }

    pub fn set_domain_input(&mut self, text: impl Into<String>) {
        self.domain_input = text.into();
    }

    /// Discard the edit and show the saved name again
    pub fn cancel_editing(&mut self) {
        self.domain_input = self.domain_name();
        self.is_editing = false;
    }

    /// Validate and persist the edited domain name; false if rejected
    pub fn save_domain(&mut self) -> bool {
        if self.commit_domain() {
            self.notifier.success("Domain name updated successfully");
            true
        } else {
            false
        }
    }

    /// Persist the domain name and the chatbot draft together
    pub fn save_all(&mut self) -> bool {
        if !self.commit_domain() {
            return false;
        }
        match self.save_chatbot_settings() {
            Ok(()) => {
                self.notifier.success("All changes saved successfully");
                true
            }
            Err(e) => {
                warn!("Failed to save chatbot settings: {:#}", e);
                self.notifier.error("Failed to save changes");
                false
            }
        }
    }

    /// One-line embed tag for the saved domain
    pub fn integration_code(&self) -> String {
        script_tag(DEFAULT_WIDGET_BASE, &self.domain_name())
    }

    /// Loader snippet keyed by the selected domain's id
    pub fn loader_snippet(&self) -> String {
        let domain = self.preferences.selected_domain();
        integration_snippet(DEFAULT_LOADER_BASE, &domain.id, "development")
    }

    pub fn copy_code(&mut self) {
        let code = self.integration_code();
        match self.clipboard.write_text(&code) {
            Ok(()) => {
                self.copied = true;
                self.notifier.success("Code copied to clipboard!");
            }
            Err(e) => {
                warn!("Clipboard write failed: {:#}", e);
                self.notifier.error("Failed to copy code");
            }
        }
    }

    /// Whether the copy button shows its confirmation state
    pub fn copied(&self) -> bool {
        self.copied
    }

    /// Return the copy button to its normal state
    pub fn reset_copied(&mut self) {
        self.copied = false;
    }

    fn commit_domain(&mut self) -> bool {
        let name = match validate_domain_name(&self.domain_input) {
            Ok(name) => name,
            Err(e) => {
                self.notifier.error(&e.to_string());
                return false;
            }
        };
        if let Err(e) = self.preferences.update_domain_name(&name) {
            warn!("{:#}", e);
            self.notifier.error("Failed to save domain name");
            return false;
        }
        info!("Domain name set to {}", name);
        self.domain_input = name;
        self.is_editing = false;
        true
    }

    fn save_chatbot_settings(&self) -> Result<()> {
        let user = self.auth.current_user()?.ok_or(AuthRequiredError)?;
        update_chatbot_settings(self.gateway.as_ref(), &user.id, &self.draft.to_update())
    }
}
