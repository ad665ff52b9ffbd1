//! Embed code generation

use regex::Regex;
use std::sync::OnceLock;

use crate::error::InvalidInputError;

/// Where the hosted widget script is served from
pub const DEFAULT_WIDGET_BASE: &str = "https://chatbot.corinna.ai/widget";

/// Where the per-domain loader script is served from in development
pub const DEFAULT_LOADER_BASE: &str = "http://localhost:5173/chatbot";

/// Check a bare domain name (no scheme, no path) and return it trimmed
pub fn validate_domain_name(name: &str) -> Result<String, InvalidInputError> {
    const RE: &str = r"^[a-zA-Z0-9][a-zA-Z0-9-]{1,61}[a-zA-Z0-9]\.[a-zA-Z]{2,}$";
    static LOCK: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    let pattern = LOCK.get_or_init(|| Regex::new(RE).unwrap());

    let name = name.trim();
    if name.is_empty() {
        return Err(InvalidInputError::new("Domain name cannot be empty"));
    }
    if !pattern.is_match(name) {
        return Err(InvalidInputError::new("Please enter a valid domain name"));
    }
    Ok(name.to_string())
}

/// One-line script tag loading the hosted widget for `domain_name`
pub fn script_tag(widget_base: &str, domain_name: &str) -> String {
    format!(
        "<script src=\"{}/{}\"></script>",
        widget_base.trim_end_matches('/'),
        domain_name
    )
}

/// Multi-line integration snippet pasted before `</body>` on the customer's site
pub fn integration_snippet(loader_base: &str, domain_id: &str, env: &str) -> String {
    format!(
        "<!-- Chatbot Integration -->\n<script \n  src=\"{base}/{id}/loader.js\"\n  data-chatbot-id=\"{id}\"\n  data-env=\"{env}\"\n  async\n></script>",
        base = loader_base.trim_end_matches('/'),
        id = domain_id,
        env = env,
    )
}
