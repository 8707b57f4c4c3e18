//! Application configuration management.
//!
//! Holds the remote server location, its application keys and an optional
//! cache directory override. Stored at `~/.config/lfgcache/config.json`;
//! every field can be overridden from the environment.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "lfgcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Settings file name in the cache directory
const SETTINGS_FILE: &str = "settings.json";

pub const SERVER_URL_VAR: &str = "LFGCACHE_SERVER_URL";
pub const APP_ID_VAR: &str = "LFGCACHE_APP_ID";
pub const REST_KEY_VAR: &str = "LFGCACHE_REST_KEY";
pub const CACHE_DIR_VAR: &str = "LFGCACHE_CACHE_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    pub server_url: Option<String>,
    pub application_id: Option<String>,
    pub rest_api_key: Option<String>,
    pub cache_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Apply overrides from `lookup` (normally `std::env::var`).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(SERVER_URL_VAR) {
            self.server_url = Some(url);
        }
        if let Some(id) = lookup(APP_ID_VAR) {
            self.application_id = Some(id);
        }
        if let Some(key) = lookup(REST_KEY_VAR) {
            self.rest_api_key = Some(key);
        }
        if let Some(dir) = lookup(CACHE_DIR_VAR) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        self
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn settings_path(&self) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join(SETTINGS_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"server_url":"https://old.example.com","application_id":"app","rest_api_key":null,"cache_dir":null}"#,
        )
        .unwrap();

        let config = Config::load_from(&path)
            .unwrap()
            .with_overrides(|name| match name {
                SERVER_URL_VAR => Some("https://new.example.com".to_string()),
                CACHE_DIR_VAR => Some("/tmp/lfg".to_string()),
                _ => None,
            });

        assert_eq!(config.server_url.as_deref(), Some("https://new.example.com"));
        assert_eq!(config.application_id.as_deref(), Some("app"));
        assert_eq!(config.cache_dir().unwrap(), PathBuf::from("/tmp/lfg"));
        assert_eq!(
            config.settings_path().unwrap(),
            PathBuf::from("/tmp/lfg/settings.json")
        );
    }

    #[test]
    fn test_bad_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
