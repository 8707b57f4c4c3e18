use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Snapshot, StoreError};
use crate::utils::relative_age;

/// Store file name in the cache directory
const STORE_FILE: &str = "store.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        relative_age(self.cached_at, Utc::now())
    }
}

/// Where the foreground snapshot is persisted.
pub trait DurableTier: Send + Sync {
    /// The last snapshot written, if any.
    fn load(&self) -> Result<Option<CachedData<Snapshot>>, StoreError>;

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
}

pub struct JsonFileTier {
    path: PathBuf,
}

impl JsonFileTier {
    pub fn new(cache_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(cache_dir)?;
        Ok(Self {
            path: cache_dir.join(STORE_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DurableTier for JsonFileTier {
    fn load(&self) -> Result<Option<CachedData<Snapshot>>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)?;
        let cached: CachedData<Snapshot> = serde_json::from_str(&contents)?;
        Ok(Some(cached))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let cached = CachedData::new(snapshot);
        let contents = serde_json::to_string_pretty(&cached)?;
        // Write next to the target and rename so a crash never leaves half a file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = ?self.path, "Store snapshot written");
        Ok(())
    }
}

/// Keeps the durable copy in memory. Writes can be made to fail to exercise
/// the non-fatal durable path.
#[derive(Default)]
pub struct MemoryTier {
    saved: Mutex<Option<CachedData<Snapshot>>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn saved(&self) -> Option<Snapshot> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|cached| cached.data.clone())
    }
}

impl DurableTier for MemoryTier {
    fn load(&self) -> Result<Option<CachedData<Snapshot>>, StoreError> {
        Ok(self.saved.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory tier rejecting writes".to_string()));
        }
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = Some(CachedData::new(snapshot.clone()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, LevelTier, Listing};
    use crate::store::LocalStore;
    use chrono::Duration;
    use std::sync::Arc;

    #[test]
    fn test_cached_data_age() {
        let fresh = CachedData::new(());
        assert_eq!(fresh.age_display(), "just now");
        assert!(fresh.age_minutes() <= 1);

        let mut old = CachedData::new(());
        old.cached_at = Utc::now() - Duration::minutes(61);
        assert_eq!(old.age_minutes(), 61);
    }

    fn seeded_snapshot() -> Snapshot {
        let store = LocalStore::in_memory();
        let mut tx = store.begin();
        let mut game = Category {
            remote_id: "G1".to_string(),
            display_name: "Destiny".to_string(),
            short_name: "D".to_string(),
            primary_level: LevelTier {
                min: 1,
                max: 40,
                name: Some("Light".to_string()),
            },
            secondary_level: LevelTier::default(),
            post_expiry_hours: 2,
            platforms: Vec::new(),
            characters: Vec::new(),
            game_types: Vec::new(),
            presets: None,
        };
        game.replace_children(&["PC".to_string()], &["Hunter".to_string()], &["Raid".to_string()]);
        tx.insert(game);
        for id in ["P1", "P2"] {
            tx.insert(Listing {
                remote_id: id.to_string(),
                category_remote_id: "G1".to_string(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
                device_id: "DEVICE".to_string(),
                platform: "PC".to_string(),
                character: "Hunter".to_string(),
                level_tier1: 40,
                level_tier2: 0,
                description: "LF1M".to_string(),
                type_tag: "Raid".to_string(),
                mic: true,
                player_handle: "guardian".to_string(),
            });
        }
        store.commit_foreground(tx).unwrap();
        store.snapshot()
    }

    #[test]
    fn test_json_tier_round_trips_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let tier = JsonFileTier::new(dir.path()).unwrap();
        assert!(tier.load().unwrap().is_none());

        let snapshot = seeded_snapshot();
        tier.save(&snapshot).unwrap();
        assert!(tier.path().exists());

        let loaded = tier.load().unwrap().unwrap();
        assert_eq!(loaded.data, snapshot);
        assert_eq!(loaded.data.len::<Category>(), 1);
        assert_eq!(loaded.data.len::<Listing>(), 2);
    }

    #[test]
    fn test_reopened_store_keeps_keys_unique() {
        let dir = tempfile::tempdir().unwrap();
        let tier = Arc::new(JsonFileTier::new(dir.path()).unwrap());
        tier.save(&seeded_snapshot()).unwrap();

        let store = LocalStore::open(tier).unwrap();
        let mut tx = store.begin();
        let key = tx.insert(Category {
            remote_id: "G2".to_string(),
            display_name: "Halo".to_string(),
            short_name: "H".to_string(),
            primary_level: LevelTier::default(),
            secondary_level: LevelTier::default(),
            post_expiry_hours: -1,
            platforms: Vec::new(),
            characters: Vec::new(),
            game_types: Vec::new(),
            presets: None,
        });
        store.commit_foreground(tx).unwrap();

        let keys: Vec<_> = store.query::<Category>(None, None).into_iter().map(|s| s.key).collect();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys.last(), Some(&key));
        assert_eq!(store.count::<Listing>(), 2);
    }

    #[test]
    fn test_json_tier_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let tier = JsonFileTier::new(dir.path()).unwrap();
        std::fs::write(tier.path(), "not json").unwrap();
        assert!(matches!(tier.load(), Err(StoreError::Serialization(_))));
    }

    #[test]
    fn test_memory_tier_failure_switch() {
        let tier = MemoryTier::new();
        tier.set_fail_writes(true);
        assert!(tier.save(&Snapshot::default()).is_err());
        assert_eq!(tier.writes(), 0);

        tier.set_fail_writes(false);
        tier.save(&Snapshot::default()).unwrap();
        assert_eq!(tier.writes(), 1);
        assert!(tier.saved().is_some());
    }
}
