//! Persisted sync bookkeeping.
//!
//! Records whether the game list has been downloaded, when each game's posts
//! were last synced, when the user last posted, and the stable identifier
//! this device submits posts under. Stored as JSON next to the cache;
//! a failed write is logged and the in-memory value still applies.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub categories_downloaded: bool,
    /// Category remote id -> time its listings were last downloaded.
    #[serde(default)]
    pub last_sync: BTreeMap<String, DateTime<Utc>>,
    #[serde(default)]
    pub last_submission: Option<DateTime<Utc>>,
    #[serde(default)]
    pub device_id: Option<String>,
}

pub struct SettingsStore {
    path: Option<PathBuf>,
    data: Mutex<Settings>,
}

impl SettingsStore {
    /// Load settings from `path`, starting empty if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let data = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse settings file: {}", path.display()))?
        } else {
            Settings::default()
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            data: Mutex::new(data),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: Mutex::new(Settings::default()),
        }
    }

    pub fn snapshot(&self) -> Settings {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn update(&self, apply: impl FnOnce(&mut Settings)) {
        let current = {
            let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
            apply(&mut data);
            data.clone()
        };
        if let Err(e) = self.persist(&current) {
            warn!(error = %e, "Failed to save settings");
        }
    }

    fn persist(&self, settings: &Settings) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(settings)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn set_categories_downloaded(&self, downloaded: bool) {
        self.update(|s| s.categories_downloaded = downloaded);
    }

    pub fn categories_downloaded(&self) -> bool {
        self.snapshot().categories_downloaded
    }

    pub fn set_last_sync_time(&self, category_remote_id: &str, at: DateTime<Utc>) {
        self.update(|s| {
            s.last_sync.insert(category_remote_id.to_string(), at);
        });
    }

    pub fn last_sync_time(&self, category_remote_id: &str) -> Option<DateTime<Utc>> {
        self.snapshot().last_sync.get(category_remote_id).copied()
    }

    pub fn set_last_submission_time(&self, at: DateTime<Utc>) {
        self.update(|s| s.last_submission = Some(at));
    }

    pub fn last_submission_time(&self) -> Option<DateTime<Utc>> {
        self.snapshot().last_submission
    }

    /// Identifier this device posts under. Generated once, then kept.
    pub fn device_id(&self) -> String {
        if let Some(id) = self.snapshot().device_id {
            return id;
        }
        let mut generated = None;
        self.update(|s| {
            // Another caller may have generated one meanwhile
            let id = s.device_id.get_or_insert_with(generate_device_id);
            generated = Some(id.clone());
        });
        generated.unwrap_or_else(generate_device_id)
    }
}

/// Random version 4 UUID in upper-case hyphenated form.
fn generate_device_id() -> String {
    Uuid::new_v4().hyphenated().to_string().to_uppercase()
}
