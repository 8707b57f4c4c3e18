use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{DurableTier, MemoryTier, StoreError};
use crate::filter::{FieldSource, Filter, Sort};
use crate::models::{Category, Listing};

/// Store-assigned record handle. Unrelated to the remote id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalKey(u64);

/// A record together with its local handle.
#[derive(Debug, Clone, PartialEq)]
pub struct Stored<E> {
    pub key: LocalKey,
    pub record: E,
}

/// Every table of the store at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    next_key: u64,
    categories: BTreeMap<LocalKey, Category>,
    listings: BTreeMap<LocalKey, Listing>,
}

/// A record type the store keeps a table for.
pub trait Entity: Clone + FieldSource + Send + Sync + 'static {
    const NAME: &'static str;

    fn remote_id(&self) -> &str;

    fn table(snapshot: &Snapshot) -> &BTreeMap<LocalKey, Self>;

    fn table_mut(snapshot: &mut Snapshot) -> &mut BTreeMap<LocalKey, Self>;
}

impl Entity for Category {
    const NAME: &'static str = "Category";

    fn remote_id(&self) -> &str {
        &self.remote_id
    }

    fn table(snapshot: &Snapshot) -> &BTreeMap<LocalKey, Self> {
        &snapshot.categories
    }

    fn table_mut(snapshot: &mut Snapshot) -> &mut BTreeMap<LocalKey, Self> {
        &mut snapshot.categories
    }
}

impl Entity for Listing {
    const NAME: &'static str = "Listing";

    fn remote_id(&self) -> &str {
        &self.remote_id
    }

    fn table(snapshot: &Snapshot) -> &BTreeMap<LocalKey, Self> {
        &snapshot.listings
    }

    fn table_mut(snapshot: &mut Snapshot) -> &mut BTreeMap<LocalKey, Self> {
        &mut snapshot.listings
    }
}

impl Snapshot {
    pub fn len<E: Entity>(&self) -> usize {
        E::table(self).len()
    }

    fn allocate_key(&mut self) -> LocalKey {
        self.next_key += 1;
        LocalKey(self.next_key)
    }

    fn query<E: Entity>(&self, filter: Option<&Filter>, sort: Option<&Sort>) -> Vec<Stored<E>> {
        let mut rows: Vec<Stored<E>> = E::table(self)
            .iter()
            .filter(|(_, record)| filter.map_or(true, |f| f.matches(*record)))
            .map(|(key, record)| Stored {
                key: *key,
                record: record.clone(),
            })
            .collect();
        if let Some(sort) = sort {
            rows.sort_by(|a, b| sort.compare(&a.record, &b.record));
        }
        rows
    }

    fn check_unique<E: Entity>(&self) -> Result<(), StoreError> {
        let mut seen = HashSet::new();
        for record in E::table(self).values() {
            if !seen.insert(record.remote_id()) {
                return Err(StoreError::Duplicate {
                    entity: E::NAME,
                    remote_id: record.remote_id().to_string(),
                });
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), StoreError> {
        self.check_unique::<Category>()?;
        self.check_unique::<Listing>()?;

        let categories: HashSet<&str> = self
            .categories
            .values()
            .map(|c| c.remote_id.as_str())
            .collect();
        if let Some(orphan) = self
            .listings
            .values()
            .find(|l| !categories.contains(l.category_remote_id.as_str()))
        {
            return Err(StoreError::Orphan {
                remote_id: orphan.remote_id.clone(),
                category_remote_id: orphan.category_remote_id.clone(),
            });
        }
        Ok(())
    }
}

/// Working copy of the foreground tier. Nothing is visible to readers until
/// it is handed to `LocalStore::commit_foreground`.
#[derive(Debug)]
pub struct Transaction {
    base_generation: u64,
    snapshot: Snapshot,
    changed: bool,
}

impl Transaction {
    pub fn query<E: Entity>(&self, filter: Option<&Filter>, sort: Option<&Sort>) -> Vec<Stored<E>> {
        self.snapshot.query(filter, sort)
    }

    pub fn get_mut<E: Entity>(&mut self, key: LocalKey) -> Option<&mut E> {
        let record = E::table_mut(&mut self.snapshot).get_mut(&key);
        if record.is_some() {
            self.changed = true;
        }
        record
    }

    pub fn insert<E: Entity>(&mut self, record: E) -> LocalKey {
        let key = self.snapshot.allocate_key();
        E::table_mut(&mut self.snapshot).insert(key, record);
        self.changed = true;
        key
    }

    pub fn delete<E: Entity>(&mut self, key: LocalKey) -> Option<E> {
        let removed = E::table_mut(&mut self.snapshot).remove(&key);
        if removed.is_some() {
            self.changed = true;
        }
        removed
    }

    pub fn delete_matching<E: Entity>(&mut self, filter: &Filter) -> usize {
        let table = E::table_mut(&mut self.snapshot);
        let before = table.len();
        table.retain(|_, record| !filter.matches(&*record));
        let removed = before - table.len();
        if removed > 0 {
            self.changed = true;
        }
        removed
    }

    pub fn has_changes(&self) -> bool {
        self.changed
    }
}

struct Committed {
    generation: u64,
    snapshot: Snapshot,
}

/// The local cache: a read-visible foreground snapshot backed by a durable
/// tier that is written after the fact.
///
/// All mutation goes through `begin`/`commit_foreground`, or through
/// `batch_delete` for bulk removals.
pub struct LocalStore {
    foreground: RwLock<Committed>,
    durable: Arc<dyn DurableTier>,
    /// Serializes durable writes so an older snapshot never lands last.
    durable_lock: tokio::sync::Mutex<()>,
    durable_generation: AtomicU64,
}

impl LocalStore {
    /// Open the store, starting from whatever the durable tier last saved.
    pub fn open(durable: Arc<dyn DurableTier>) -> Result<Self, StoreError> {
        let snapshot = match durable.load()? {
            Some(cached) => {
                debug!(
                    categories = cached.data.len::<Category>(),
                    listings = cached.data.len::<Listing>(),
                    age = %cached.age_display(),
                    "Loaded store snapshot"
                );
                cached.data
            }
            None => Snapshot::default(),
        };

        Ok(Self {
            foreground: RwLock::new(Committed {
                generation: 0,
                snapshot,
            }),
            durable,
            durable_lock: tokio::sync::Mutex::new(()),
            durable_generation: AtomicU64::new(0),
        })
    }

    /// Empty store whose durable tier never leaves memory.
    pub fn in_memory() -> Self {
        Self {
            foreground: RwLock::new(Committed {
                generation: 0,
                snapshot: Snapshot::default(),
            }),
            durable: Arc::new(MemoryTier::new()),
            durable_lock: tokio::sync::Mutex::new(()),
            durable_generation: AtomicU64::new(0),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Committed> {
        self.foreground.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Committed> {
        self.foreground.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bumped by every foreground commit that changed something.
    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    pub fn query<E: Entity>(&self, filter: Option<&Filter>, sort: Option<&Sort>) -> Vec<Stored<E>> {
        self.read().snapshot.query(filter, sort)
    }

    pub fn count<E: Entity>(&self) -> usize {
        self.read().snapshot.len::<E>()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.read().snapshot.clone()
    }

    pub fn begin(&self) -> Transaction {
        let committed = self.read();
        Transaction {
            base_generation: committed.generation,
            snapshot: committed.snapshot.clone(),
            changed: false,
        }
    }

    /// Make a transaction visible to readers. Fails without touching the
    /// foreground if the transaction would break uniqueness or leave a
    /// listing without its category, or if another commit got in first.
    pub fn commit_foreground(&self, tx: Transaction) -> Result<u64, StoreError> {
        let mut committed = self.write();
        if !tx.changed {
            return Ok(committed.generation);
        }
        if committed.generation != tx.base_generation {
            return Err(StoreError::Conflict {
                expected: tx.base_generation,
                found: committed.generation,
            });
        }
        tx.snapshot.validate()?;

        committed.generation += 1;
        committed.snapshot = tx.snapshot;
        debug!(generation = committed.generation, "Foreground tier committed");
        Ok(committed.generation)
    }

    /// Persist the current foreground snapshot to the durable tier.
    pub async fn commit_durable(&self) -> Result<(), StoreError> {
        let _guard = self.durable_lock.lock().await;

        let (generation, snapshot) = {
            let committed = self.read();
            (committed.generation, committed.snapshot.clone())
        };
        if generation == self.durable_generation.load(Ordering::SeqCst) {
            return Ok(());
        }

        let tier = Arc::clone(&self.durable);
        tokio::task::spawn_blocking(move || tier.save(&snapshot))
            .await
            .map_err(|e| StoreError::Background(e.to_string()))??;

        self.durable_generation.store(generation, Ordering::SeqCst);
        debug!(generation, "Durable tier committed");
        Ok(())
    }

    /// Run `commit_durable` in the background. Failure is logged only; the
    /// foreground state stays as committed. The handle may be dropped.
    pub fn spawn_durable_commit(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = store.commit_durable().await {
                warn!(error = %e, "Durable commit failed, keeping foreground state");
            }
        })
    }

    /// Remove every matching record and write straight through to the
    /// durable tier. Meant for listings; removing categories this way skips
    /// the orphan check.
    pub async fn batch_delete<E: Entity>(&self, filter: &Filter) -> Result<usize, StoreError> {
        let removed = {
            let mut committed = self.write();
            let table = E::table_mut(&mut committed.snapshot);
            let before = table.len();
            table.retain(|_, record| !filter.matches(&*record));
            let removed = before - table.len();
            if removed > 0 {
                committed.generation += 1;
            }
            removed
        };

        if removed > 0 {
            self.commit_durable().await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LevelTier;
    use chrono::Utc;

    fn category(id: &str) -> Category {
        Category {
            remote_id: id.to_string(),
            display_name: format!("Game {}", id),
            short_name: id.to_string(),
            primary_level: LevelTier::default(),
            secondary_level: LevelTier::default(),
            post_expiry_hours: -1,
            platforms: Vec::new(),
            characters: Vec::new(),
            game_types: Vec::new(),
            presets: None,
        }
    }

    fn listing(id: &str, category: &str) -> Listing {
        Listing {
            remote_id: id.to_string(),
            category_remote_id: category.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            device_id: "DEVICE".to_string(),
            platform: "PC".to_string(),
            character: "Hunter".to_string(),
            level_tier1: 1,
            level_tier2: 1,
            description: String::new(),
            type_tag: "Raid".to_string(),
            mic: false,
            player_handle: "p".to_string(),
        }
    }

    #[test]
    fn test_uncommitted_changes_are_invisible() {
        let store = LocalStore::in_memory();
        let mut tx = store.begin();
        tx.insert(category("G1"));
        assert_eq!(store.count::<Category>(), 0);

        store.commit_foreground(tx).unwrap();
        assert_eq!(store.count::<Category>(), 1);
        assert_eq!(store.generation(), 1);
    }

    #[test]
    fn test_duplicate_remote_id_is_rejected() {
        let store = LocalStore::in_memory();
        let mut tx = store.begin();
        tx.insert(category("G1"));
        tx.insert(category("G1"));
        assert!(matches!(
            store.commit_foreground(tx),
            Err(StoreError::Duplicate { entity: "Category", .. })
        ));
        assert_eq!(store.count::<Category>(), 0);
    }

    #[test]
    fn test_orphan_listing_is_rejected() {
        let store = LocalStore::in_memory();
        let mut tx = store.begin();
        tx.insert(listing("P1", "G404"));
        assert!(matches!(
            store.commit_foreground(tx),
            Err(StoreError::Orphan { .. })
        ));
    }

    #[test]
    fn test_concurrent_commit_is_a_conflict() {
        let store = LocalStore::in_memory();
        let mut first = store.begin();
        let mut second = store.begin();
        first.insert(category("G1"));
        second.insert(category("G2"));

        store.commit_foreground(first).unwrap();
        assert!(matches!(
            store.commit_foreground(second),
            Err(StoreError::Conflict { expected: 0, found: 1 })
        ));
    }

    #[test]
    fn test_empty_transaction_commits_without_new_generation() {
        let store = LocalStore::in_memory();
        let tx = store.begin();
        assert!(!tx.has_changes());
        assert_eq!(store.commit_foreground(tx).unwrap(), 0);
    }

    #[test]
    fn test_query_filters_and_sorts() {
        let store = LocalStore::in_memory();
        let mut tx = store.begin();
        tx.insert(category("G2"));
        tx.insert(category("G1"));
        tx.insert(listing("P1", "G1"));
        tx.insert(listing("P2", "G2"));
        store.commit_foreground(tx).unwrap();

        let sorted = store.query::<Category>(None, Some(&Sort::ascending("fullName")));
        let ids: Vec<&str> = sorted.iter().map(|s| s.record.remote_id.as_str()).collect();
        assert_eq!(ids, vec!["G1", "G2"]);

        let g1 = Filter::new().equals("gameId", "G1");
        let listings = store.query::<Listing>(Some(&g1), None);
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].record.remote_id, "P1");
    }

    #[tokio::test]
    async fn test_durable_commit_and_reopen() {
        let tier = Arc::new(MemoryTier::new());
        let store = LocalStore::open(tier.clone()).unwrap();
        let mut tx = store.begin();
        tx.insert(category("G1"));
        store.commit_foreground(tx).unwrap();

        store.commit_durable().await.unwrap();
        assert_eq!(tier.writes(), 1);
        // Nothing new to write
        store.commit_durable().await.unwrap();
        assert_eq!(tier.writes(), 1);

        let reopened = LocalStore::open(tier).unwrap();
        assert_eq!(reopened.count::<Category>(), 1);
    }

    #[tokio::test]
    async fn test_durable_failure_keeps_foreground() {
        let tier = Arc::new(MemoryTier::new());
        let store = LocalStore::open(tier.clone()).unwrap();
        tier.set_fail_writes(true);

        let mut tx = store.begin();
        tx.insert(category("G1"));
        store.commit_foreground(tx).unwrap();

        assert!(store.commit_durable().await.is_err());
        assert_eq!(store.count::<Category>(), 1);

        // Retried on the next durable commit
        tier.set_fail_writes(false);
        store.commit_durable().await.unwrap();
        assert_eq!(tier.saved().unwrap().len::<Category>(), 1);
    }

    #[tokio::test]
    async fn test_batch_delete_writes_through() {
        let tier = Arc::new(MemoryTier::new());
        let store = LocalStore::open(tier.clone()).unwrap();
        let mut tx = store.begin();
        tx.insert(category("G1"));
        tx.insert(listing("P1", "G1"));
        tx.insert(listing("P2", "G1"));
        store.commit_foreground(tx).unwrap();

        let filter = Filter::new().equals("objectId", "P1");
        assert_eq!(store.batch_delete::<Listing>(&filter).await.unwrap(), 1);
        assert_eq!(store.count::<Listing>(), 1);
        assert_eq!(tier.saved().unwrap().len::<Listing>(), 1);

        assert_eq!(store.batch_delete::<Listing>(&filter).await.unwrap(), 0);
    }
}
