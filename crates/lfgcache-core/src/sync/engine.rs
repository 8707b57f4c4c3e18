//! Merging remote result sets into the local store.
//!
//! Both syncs follow the same shape: download, decode each object, upsert by
//! remote id, delete the local records the download no longer contains,
//! then commit foreground-first and let the durable write follow in the
//! background.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::{ExpiryScheduler, IdentityIndex, PresetRecorder};
use crate::error::SyncError;
use crate::filter::{Filter, Sort};
use crate::models::{Category, Listing};
use crate::remote::{decode_category, decode_listing, RawObject, RemoteCategory, RemoteSource};
use crate::settings::SettingsStore;
use crate::store::{LocalKey, LocalStore, Stored, Transaction};

/// Sync coordinator. Build one at startup and share it; apart from its
/// collaborators it only holds the detached tasks it has started.
pub struct ReconciliationEngine {
    pub(super) store: Arc<LocalStore>,
    pub(super) remote: Arc<dyn RemoteSource>,
    pub(super) settings: Arc<SettingsStore>,
    pub(super) presets: PresetRecorder,
    pub(super) expiry: ExpiryScheduler,
    background: Mutex<JoinSet<()>>,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<LocalStore>,
        remote: Arc<dyn RemoteSource>,
        settings: Arc<SettingsStore>,
    ) -> Self {
        Self {
            presets: PresetRecorder::new(Arc::clone(&store)),
            expiry: ExpiryScheduler::new(Arc::clone(&store)),
            store,
            remote,
            settings,
            background: Mutex::new(JoinSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    // ===== Sync =====

    /// Download games matching `filter` and merge them into the store.
    /// Local games inside the same filter that the server no longer returns
    /// are deleted together with their posts.
    ///
    /// Returns the number of games merged.
    pub async fn sync_categories(&self, filter: Option<&Filter>) -> Result<usize, SyncError> {
        let objects = self
            .remote
            .find(Category::CLASS, filter)
            .await
            .map_err(|e| {
                error!(error = %e, "Could not download games");
                e
            })?;
        info!(count = objects.len(), "Game download count");

        let mut tx = self.store.begin();
        let index = IdentityIndex::build(tx.query::<Category>(filter, None));
        let mut inserted: HashMap<String, LocalKey> = HashMap::new();
        let mut processed: HashSet<String> = HashSet::new();

        for raw in &objects {
            let remote = match decode_category(raw) {
                Ok(remote) => remote,
                Err(e) => {
                    warn!(object_id = object_id_of(raw), error = %e, "Skipping malformed game");
                    continue;
                }
            };

            let existing = index
                .key_of(&remote.remote_id)
                .or_else(|| inserted.get(&remote.remote_id).copied());
            match existing.and_then(|key| tx.get_mut::<Category>(key)) {
                Some(category) => merge_category(category, &remote),
                None => {
                    let key = tx.insert(new_category(&remote));
                    inserted.insert(remote.remote_id.clone(), key);
                }
            }
            processed.insert(remote.remote_id);
        }

        for stale in index.missing_from(&processed) {
            delete_category(&mut tx, stale);
        }

        self.commit_staged(tx)?;
        self.settings.set_categories_downloaded(true);
        info!(count = processed.len(), "Games synced");
        Ok(processed.len())
    }

    /// Download the posts of one game and merge them into the store.
    ///
    /// The query is always scoped to the game and, unless its posts never
    /// expire, to posts younger than the game's expiry window. Local posts
    /// of the game that the download does not contain are deleted; other
    /// games' posts are left alone.
    ///
    /// Returns the number of posts merged.
    pub async fn sync_listings(
        &self,
        category_remote_id: &str,
        filter: Option<&Filter>,
    ) -> Result<usize, SyncError> {
        let category = self
            .category(category_remote_id)
            .ok_or_else(|| SyncError::CategoryNotFound(category_remote_id.to_string()))?;

        let download_started = Utc::now();
        let cutoff = category.expiry_cutoff(download_started);
        let mut query = Filter::new().equals(Listing::CATEGORY_FIELD, category_remote_id);
        if let Some(filter) = filter {
            query = query.and(filter);
        }
        if let Some(cutoff) = cutoff {
            query = query.at_least(Listing::CREATED_FIELD, cutoff);
        }

        let objects = self
            .remote
            .find(Listing::CLASS, Some(&query))
            .await
            .map_err(|e| {
                error!(game = category_remote_id, error = %e, "Could not download posts");
                e
            })?;
        info!(game = category_remote_id, count = objects.len(), "Post download count");

        let mut tx = self.store.begin();
        let known_categories: HashSet<String> = tx
            .query::<Category>(None, None)
            .into_iter()
            .map(|stored| stored.record.remote_id)
            .collect();
        let scope = Filter::new().equals(Listing::CATEGORY_FIELD, category_remote_id);
        let scoped = IdentityIndex::build(tx.query::<Listing>(Some(&scope), None));
        // Lookups span every game so a post that moved games is updated, not duplicated
        let mut all = IdentityIndex::build(tx.query::<Listing>(None, None)).into_keys();
        let mut processed: HashSet<String> = HashSet::new();

        for raw in &objects {
            let listing = match decode_listing(raw) {
                Ok(listing) => listing,
                Err(e) => {
                    warn!(object_id = object_id_of(raw), error = %e, "Skipping malformed post");
                    continue;
                }
            };
            if !known_categories.contains(&listing.category_remote_id) {
                warn!(
                    post = %listing.remote_id,
                    game = %listing.category_remote_id,
                    "Skipping post for unknown game"
                );
                continue;
            }
            if listing.is_expired(&category, download_started) {
                debug!(post = %listing.remote_id, "Skipping expired post");
                continue;
            }

            let remote_id = listing.remote_id.clone();
            match all.get(&remote_id).and_then(|key| tx.get_mut::<Listing>(*key)) {
                Some(existing) => *existing = listing,
                None => {
                    let key = tx.insert(listing);
                    all.insert(remote_id.clone(), key);
                }
            }
            processed.insert(remote_id);
        }

        for stale in scoped.missing_from(&processed) {
            debug!(post = %stale.record.remote_id, "Deleting post");
            tx.delete::<Listing>(stale.key);
        }

        self.commit_staged(tx)?;
        self.settings.set_last_sync_time(category_remote_id, download_started);
        info!(game = category_remote_id, count = processed.len(), "Posts synced");
        Ok(processed.len())
    }

    /// Foreground commit, then a detached durable commit.
    pub(super) fn commit_staged(&self, tx: Transaction) -> Result<(), SyncError> {
        self.store.commit_foreground(tx).map_err(|e| {
            error!(error = %e, "Could not save to the foreground store");
            e
        })?;
        // The task logs its own failure
        drop(self.store.spawn_durable_commit());
        Ok(())
    }

    // ===== Background work =====

    /// Start `task` without waiting for it. Callers never see its outcome.
    pub(super) fn spawn_background<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.background.lock().unwrap_or_else(PoisonError::into_inner);
        // Reap finished tasks so the set only holds live ones
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Wait for every detached task and the pending durable commit.
    /// Hosts call this before shutting the runtime down, which would
    /// otherwise cancel them.
    pub async fn finish_background(&self) {
        let mut tasks = std::mem::take(&mut *self.background.lock().unwrap_or_else(PoisonError::into_inner));
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Background task did not complete");
            }
        }
        if let Err(e) = self.store.commit_durable().await {
            warn!(error = %e, "Durable commit failed, keeping foreground state");
        }
    }

    // ===== Reads (foreground tier) =====

    /// All games, by display name.
    pub fn all_categories(&self) -> Vec<Category> {
        self.store
            .query::<Category>(None, Some(&Sort::ascending("fullName")))
            .into_iter()
            .map(|stored| stored.record)
            .collect()
    }

    pub fn category(&self, remote_id: &str) -> Option<Category> {
        let filter = Filter::new().equals("objectId", remote_id);
        self.store
            .query::<Category>(Some(&filter), None)
            .into_iter()
            .next()
            .map(|stored| stored.record)
    }

    /// Posts of one game, newest first.
    pub fn listings_for(&self, category_remote_id: &str) -> Vec<Listing> {
        let filter = Filter::new().equals(Listing::CATEGORY_FIELD, category_remote_id);
        self.listings_matching(Some(&filter))
    }

    /// Posts matching `filter`, newest first.
    pub fn listings_matching(&self, filter: Option<&Filter>) -> Vec<Listing> {
        self.store
            .query::<Listing>(filter, Some(&Sort::descending(Listing::CREATED_FIELD)))
            .into_iter()
            .map(|stored| stored.record)
            .collect()
    }
}

fn object_id_of(raw: &RawObject) -> &str {
    raw.object_id().unwrap_or("<no id>")
}

fn new_category(remote: &RemoteCategory) -> Category {
    let mut category = Category {
        remote_id: remote.remote_id.clone(),
        display_name: String::new(),
        short_name: String::new(),
        primary_level: Default::default(),
        secondary_level: Default::default(),
        post_expiry_hours: remote.post_expiry_hours,
        platforms: Vec::new(),
        characters: Vec::new(),
        game_types: Vec::new(),
        presets: None,
    };
    merge_category(&mut category, remote);
    category
}

/// Overwrite scalars; rebuild children only from a payload where all three
/// child lists are non-empty. Presets are local and left alone.
fn merge_category(category: &mut Category, remote: &RemoteCategory) {
    category.remote_id = remote.remote_id.clone();
    category.display_name = remote.display_name.clone();
    category.short_name = remote.short_name.clone();
    category.primary_level = remote.primary_level.clone();
    category.secondary_level = remote.secondary_level.clone();
    category.post_expiry_hours = remote.post_expiry_hours;

    if remote.has_complete_children() {
        category.replace_children(&remote.platforms, &remote.characters, &remote.game_types);
    } else {
        debug!(game = %remote.remote_id, "Keeping existing children, payload has an empty child list");
    }
}

/// Posts cannot outlive their game.
fn delete_category(tx: &mut Transaction, stale: &Stored<Category>) {
    let posts = Filter::new().equals(Listing::CATEGORY_FIELD, stale.record.remote_id.as_str());
    let removed_posts = tx.delete_matching::<Listing>(&posts);
    info!(
        game = %stale.record.display_name,
        posts = removed_posts,
        "Deleting game removed from the server"
    );
    tx.delete::<Category>(stale.key);
}
