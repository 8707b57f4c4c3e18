//! Posting and withdrawing listings.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use super::ReconciliationEngine;
use crate::error::SyncError;
use crate::filter::Filter;
use crate::models::{Listing, NewListing, PostPresets};
use crate::remote::RemoteSource;

impl ReconciliationEngine {
    /// Record presets, withdraw this device's earlier posts, then create the
    /// new post remotely. Returns the new post's remote id.
    ///
    /// Presets stay recorded even when the remote create fails.
    pub async fn submit_listing(&self, listing: NewListing) -> Result<String, SyncError> {
        if let Err(e) = self.record_submission(&listing) {
            warn!(error = %e, "Could not record presets");
        }

        let submitted_at = Utc::now();
        let device_id = self.settings.device_id();
        self.delete_previous_listings(&device_id, submitted_at);

        let remote_id = self
            .remote
            .create(Listing::CLASS, listing.remote_fields(&device_id))
            .await
            .map_err(|e| {
                error!(game = %listing.category_remote_id, error = %e, "Could not create post");
                e
            })?;

        self.settings.set_last_submission_time(Utc::now());
        info!(post = %remote_id, game = %listing.category_remote_id, "Post created");
        Ok(remote_id)
    }

    /// Delete every remote post from `device_id` created before `cutoff`.
    ///
    /// Runs detached and only logs its outcome; `finish_background` waits
    /// for it.
    pub fn delete_previous_listings(&self, device_id: &str, cutoff: DateTime<Utc>) {
        let remote: Arc<dyn RemoteSource> = Arc::clone(&self.remote);
        let filter = Filter::new()
            .equals(Listing::DEVICE_FIELD, device_id)
            .before(Listing::CREATED_FIELD, cutoff);
        self.spawn_background(delete_matching_posts(remote, filter));
    }

    /// Delete a post remotely. The local copy goes away on the next
    /// `sync_listings` of its game.
    pub async fn delete_listing(&self, remote_id: &str) -> Result<(), SyncError> {
        self.remote
            .delete_by_id(Listing::CLASS, remote_id)
            .await
            .map_err(|e| {
                error!(post = remote_id, error = %e, "Could not delete post");
                e
            })?;
        info!(post = remote_id, "Post deleted");
        Ok(())
    }

    pub fn record_submission(&self, listing: &NewListing) -> Result<(), SyncError> {
        self.presets.record_submission(listing)
    }

    pub fn presets_for(&self, category_remote_id: &str) -> Option<PostPresets> {
        self.presets.presets_for(category_remote_id)
    }
}

async fn delete_matching_posts(remote: Arc<dyn RemoteSource>, filter: Filter) {
    let previous = match remote.find(Listing::CLASS, Some(&filter)).await {
        Ok(previous) => previous,
        Err(e) => {
            debug!(error = %e, "Could not look up previous posts");
            return;
        }
    };

    let ids: Vec<String> = previous
        .iter()
        .filter_map(|raw| raw.object_id().ok().map(str::to_string))
        .collect();
    let results = join_all(ids.iter().map(|id| remote.delete_by_id(Listing::CLASS, id))).await;
    for (id, result) in ids.iter().zip(results) {
        match result {
            Ok(()) => debug!(post = %id, "Deleted previous post"),
            Err(e) => debug!(post = %id, error = %e, "Could not delete previous post"),
        }
    }
}
