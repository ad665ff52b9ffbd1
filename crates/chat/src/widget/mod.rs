//! Embeddable widget helpers
//!
//! Domain name validation, the copyable embed snippets, and the message
//! exchange with the live preview frame.

mod embed;
mod snippet;

pub use embed::{EmbedBridge, EmbedConfig, EmbedMessage, WidgetAppearance};
pub use snippet::{
    DEFAULT_LOADER_BASE, DEFAULT_WIDGET_BASE, integration_snippet, script_tag,
    validate_domain_name,
};
