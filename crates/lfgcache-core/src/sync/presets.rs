use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::error::SyncError;
use crate::filter::Filter;
use crate::models::{Category, NewListing, PostPresets};
use crate::store::LocalStore;

/// Keeps each game's last submitted post so the next one can be pre-filled.
pub struct PresetRecorder {
    store: Arc<LocalStore>,
}

impl PresetRecorder {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// Replace the presets of the submission's game with its values.
    pub fn record_submission(&self, listing: &NewListing) -> Result<(), SyncError> {
        let mut tx = self.store.begin();
        let filter = Filter::new().equals("objectId", listing.category_remote_id.as_str());
        let key = tx
            .query::<Category>(Some(&filter), None)
            .first()
            .map(|stored| stored.key)
            .ok_or_else(|| SyncError::CategoryNotFound(listing.category_remote_id.clone()))?;

        if let Some(category) = tx.get_mut::<Category>(key) {
            category.presets = Some(PostPresets::from_submission(listing, Utc::now()));
        }
        self.store.commit_foreground(tx)?;
        drop(self.store.spawn_durable_commit());
        debug!(game = %listing.category_remote_id, "Presets recorded");
        Ok(())
    }

    pub fn presets_for(&self, category_remote_id: &str) -> Option<PostPresets> {
        let filter = Filter::new().equals("objectId", category_remote_id);
        self.store
            .query::<Category>(Some(&filter), None)
            .into_iter()
            .next()
            .and_then(|stored| stored.record.presets)
    }
}
