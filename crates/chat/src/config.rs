//! Configuration loading for the hosted backend
//!
//! Supports loading project credentials from (in order of priority):
//! 1. Compile-time embedded credentials (for production builds)
//! 2. JSON file (~/.config/relay/backend.json)
//! 3. Runtime environment variables (fallback)

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Credentials filename in the Relay config directory
const CREDENTIALS_FILE: &str = "backend.json";

const URL_VAR: &str = "RELAY_BACKEND_URL";
const KEY_VAR: &str = "RELAY_BACKEND_ANON_KEY";

/// Project URL and public (anon) API key for the hosted backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendCredentials {
    pub url: String,
    pub anon_key: String,
}

impl BackendCredentials {
    /// Load credentials using the following priority:
    /// 1. Compile-time embedded credentials (for production builds)
    /// 2. JSON file (~/.config/relay/backend.json)
    /// 3. Runtime environment variables
    pub fn load() -> Result<Self> {
        if let Some(creds) = Self::from_compile_time() {
            return Ok(creds);
        }

        if config::config_exists(CREDENTIALS_FILE) {
            let creds: BackendCredentials = config::load_json(CREDENTIALS_FILE)?;
            return creds.validated();
        }

        Self::from_env()
    }

    /// Load credentials embedded at compile time via environment variables.
    /// Build with: RELAY_BACKEND_URL=xxx RELAY_BACKEND_ANON_KEY=yyy cargo build --release
    pub fn from_compile_time() -> Option<Self> {
        let url = option_env!("RELAY_BACKEND_URL")?;
        let anon_key = option_env!("RELAY_BACKEND_ANON_KEY")?;

        if url.is_empty() || anon_key.is_empty() {
            return None;
        }

        Self {
            url: url.to_string(),
            anon_key: anon_key.to_string(),
        }
        .validated()
        .ok()
    }

    /// Load credentials from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let creds: BackendCredentials = config::load_json_file(path)?;
        creds.validated()
    }

    /// Parse credentials from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let creds: BackendCredentials =
            serde_json::from_str(json).context("Failed to parse credentials JSON")?;
        creds.validated()
    }

    /// Load credentials from environment variables
    pub fn from_env() -> Result<Self> {
        let url = std::env::var(URL_VAR)
            .with_context(|| format!("{} environment variable not set", URL_VAR))?;
        let anon_key = std::env::var(KEY_VAR)
            .with_context(|| format!("{} environment variable not set", KEY_VAR))?;

        Self { url, anon_key }.validated()
    }

    /// Get the default credentials file path (~/.config/relay/backend.json)
    pub fn default_credentials_path() -> Option<PathBuf> {
        config::config_path(CREDENTIALS_FILE)
    }

    /// Check if credentials are available (compile-time, file, or env vars)
    pub fn is_available() -> bool {
        if Self::from_compile_time().is_some() {
            return true;
        }
        if config::config_exists(CREDENTIALS_FILE) {
            return true;
        }
        std::env::var(URL_VAR).is_ok() && std::env::var(KEY_VAR).is_ok()
    }

    fn validated(self) -> Result<Self> {
        let url = Url::parse(&self.url).with_context(|| format!("Invalid backend URL: {}", self.url))?;
        if url.scheme() != "https" && url.scheme() != "http" {
            bail!("Backend URL must use http or https: {}", self.url);
        }
        if self.anon_key.trim().is_empty() {
            bail!("Backend anon key is empty");
        }
        Ok(self)
    }
}
