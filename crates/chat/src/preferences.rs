//! Local dashboard preferences
//!
//! The selected domain and UI toggles live on the user's machine, not in the
//! backend. They are stored as JSON and a missing or unreadable file means
//! defaults.

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Preferences filename in the Relay config directory
const PREFERENCES_FILE: &str = "preferences.json";

/// The domain the dashboard is currently scoped to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedDomain {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
}

impl Default for SelectedDomain {
    fn default() -> Self {
        Self {
            id: "1".to_string(),
            name: "example.com".to_string(),
            icon: Some("🌐".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub selected_domain: SelectedDomain,
    #[serde(default)]
    pub sidebar_collapsed: bool,
}

/// File-backed preferences; every change is written through
pub struct PreferenceStore {
    path: PathBuf,
    preferences: RwLock<Preferences>,
}

impl PreferenceStore {
    /// Open the store at `path`, falling back to defaults
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let preferences = if path.exists() {
            match config::load_json_file::<Preferences>(&path) {
                Ok(prefs) => prefs,
                Err(e) => {
                    warn!("Ignoring unreadable preferences at {}: {:#}", path.display(), e);
                    Preferences::default()
                }
            }
        } else {
            debug!("No preferences at {}, using defaults", path.display());
            Preferences::default()
        };
        Self {
            path,
            preferences: RwLock::new(preferences),
        }
    }

    /// Open the store in the Relay config directory (~/.config/relay/preferences.json)
    pub fn open_default() -> Result<Self> {
        let path = config::config_path(PREFERENCES_FILE)
            .context("Could not determine config directory")?;
        Ok(Self::open(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn preferences(&self) -> Preferences {
        self.preferences.read().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn selected_domain(&self) -> SelectedDomain {
        self.preferences().selected_domain
    }

    pub fn set_selected_domain(&self, domain: SelectedDomain) -> Result<()> {
        self.modify(|p| p.selected_domain = domain)
    }

    /// Rename the selected domain, keeping its id and icon
    pub fn update_domain_name(&self, name: &str) -> Result<()> {
        let name = name.to_string();
        self.modify(|p| p.selected_domain.name = name)
    }

    pub fn set_sidebar_collapsed(&self, collapsed: bool) -> Result<()> {
        self.modify(|p| p.sidebar_collapsed = collapsed)
    }

    fn modify(&self, f: impl FnOnce(&mut Preferences)) -> Result<()> {
        let snapshot = {
            let mut prefs = self
                .preferences
                .write()
                .map_err(|_| anyhow!("preferences lock poisoned"))?;
            f(&mut prefs);
            prefs.clone()
        };
        config::save_json_file(&self.path, &snapshot)
            .with_context(|| format!("Failed to save preferences to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_missing() {
        let dir = TempDir::new().unwrap();
        let store = PreferenceStore::open(dir.path().join("preferences.json"));
        let domain = store.selected_domain();
        assert_eq!(domain.id, "1");
        assert_eq!(domain.name, "example.com");
        assert_eq!(domain.icon.as_deref(), Some("🌐"));
        assert!(!store.preferences().sidebar_collapsed);
    }

    #[test]
    fn test_defaults_when_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = PreferenceStore::open(&path);
        assert_eq!(store.preferences(), Preferences::default());
    }

    #[test]
    fn test_update_domain_name_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("preferences.json");

        let store = PreferenceStore::open(&path);
        store.update_domain_name("shop.com").unwrap();
        store.set_sidebar_collapsed(true).unwrap();

        let reopened = PreferenceStore::open(&path);
        let prefs = reopened.preferences();
        assert_eq!(prefs.selected_domain.name, "shop.com");
        assert_eq!(prefs.selected_domain.id, "1");
        assert!(prefs.sidebar_collapsed);
    }
}
