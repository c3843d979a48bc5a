//! Controller settings persisted with sled
//!
//! The whole settings record lives under one key, so every load sees a
//! complete record and every save replaces it in a single insert.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sled::Db;

use crate::config::Role;
use crate::error::{AppError, Result};

const SETTINGS_TREE: &str = "system";
const SETTINGS_KEY: &[u8] = b"settings";

/// Settings that outlive a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppSettings {
    /// Retry failed connections instead of stopping
    pub auto_restart: bool,
    /// Selected relay role
    pub role: Role,
    /// Last relay configuration file used
    pub config_path: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            auto_restart: true,
            role: Role::Client,
            config_path: None,
        }
    }
}

/// Settings storage using sled embedded database
pub struct SettingsStore {
    db: Arc<Db>,
}

impl SettingsStore {
    /// Open (or create) the store at `db_path`
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(db_path.as_ref())
            .map_err(|e| AppError::Storage(format!("Failed to open sled database: {e}")))?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Open the store at the default location
    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path())
    }

    /// `<data dir>/relayctl/settings.db`
    pub fn default_path() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("relayctl");
        path.push("settings.db");
        path
    }

    /// Load settings, falling back to defaults when nothing is stored
    pub fn load(&self) -> Result<AppSettings> {
        let tree = self
            .db
            .open_tree(SETTINGS_TREE)
            .map_err(|e| AppError::Storage(format!("Failed to open settings tree: {e}")))?;

        let Some(bytes) = tree
            .get(SETTINGS_KEY)
            .map_err(|e| AppError::Storage(format!("Failed to read settings: {e}")))?
        else {
            return Ok(AppSettings::default());
        };

        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::Serialization(format!("Failed to deserialize settings: {e}")))
    }

    /// Replace the stored settings
    pub fn save(&self, settings: &AppSettings) -> Result<()> {
        let tree = self
            .db
            .open_tree(SETTINGS_TREE)
            .map_err(|e| AppError::Storage(format!("Failed to open settings tree: {e}")))?;

        let bytes = serde_json::to_vec(settings)
            .map_err(|e| AppError::Serialization(format!("Failed to serialize settings: {e}")))?;

        tree.insert(SETTINGS_KEY, bytes)
            .map_err(|e| AppError::Storage(format!("Failed to write settings: {e}")))?;

        self.db
            .flush()
            .map_err(|e| AppError::Storage(format!("Failed to flush database: {e}")))?;

        tracing::debug!("Saved settings: {:?}", settings);
        Ok(())
    }

    pub fn set_auto_restart(&self, enabled: bool) -> Result<AppSettings> {
        self.update(|s| s.auto_restart = enabled)
    }

    pub fn set_role(&self, role: Role) -> Result<AppSettings> {
        self.update(|s| s.role = role)
    }

    pub fn set_config_path(&self, path: Option<PathBuf>) -> Result<AppSettings> {
        self.update(|s| s.config_path = path)
    }

    fn update(&self, apply: impl FnOnce(&mut AppSettings)) -> Result<AppSettings> {
        let mut settings = self.load()?;
        apply(&mut settings);
        self.save(&settings)?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = SettingsStore::open(temp_dir.path().join("settings.db")).unwrap();

        let settings = store.load().unwrap();
        assert_eq!(settings, AppSettings::default());
        assert!(settings.auto_restart);
        assert_eq!(settings.role, Role::Client);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = SettingsStore::open(temp_dir.path().join("settings.db")).unwrap();

        let settings = AppSettings {
            auto_restart: false,
            role: Role::Server,
            config_path: Some(PathBuf::from("/etc/rproxy.json")),
        };
        store.save(&settings).unwrap();

        assert_eq!(store.load().unwrap(), settings);
    }

    #[test]
    fn test_field_setters() {
        let temp_dir = TempDir::new().unwrap();
        let store = SettingsStore::open(temp_dir.path().join("settings.db")).unwrap();

        store.set_role(Role::Server).unwrap();
        store.set_auto_restart(false).unwrap();
        let settings = store
            .set_config_path(Some(PathBuf::from("relay.json")))
            .unwrap();

        assert_eq!(settings.role, Role::Server);
        assert!(!settings.auto_restart);
        assert_eq!(store.load().unwrap(), settings);
    }
}
