//! Time-based removal of cached posts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::ReconciliationEngine;
use crate::filter::Filter;
use crate::models::{Category, Listing};
use crate::store::LocalStore;

/// Outcome of one purge pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Posts removed across all games.
    pub deleted: usize,
    /// Remote ids of games whose delete could not be persisted.
    pub failed: Vec<String>,
}

impl PurgeReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct ExpiryScheduler {
    store: Arc<LocalStore>,
}

impl ExpiryScheduler {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    pub async fn purge_expired(&self) -> PurgeReport {
        self.purge_expired_at(Utc::now()).await
    }

    /// Delete every post older than its game's expiry window as of `now`.
    ///
    /// Each game is deleted and written through on its own; a failure for
    /// one game is recorded in the report and the rest still run.
    pub async fn purge_expired_at(&self, now: DateTime<Utc>) -> PurgeReport {
        let mut report = PurgeReport::default();

        for stored in self.store.query::<Category>(None, None) {
            let category = stored.record;
            let Some(cutoff) = category.expiry_cutoff(now) else {
                continue;
            };
            let filter = Filter::new()
                .equals(Listing::CATEGORY_FIELD, category.remote_id.as_str())
                .before(Listing::CREATED_FIELD, cutoff);

            match self.store.batch_delete::<Listing>(&filter).await {
                Ok(0) => {}
                Ok(deleted) => {
                    debug!(game = %category.remote_id, deleted, "Purged expired posts");
                    report.deleted += deleted;
                }
                Err(e) => {
                    warn!(game = %category.remote_id, error = %e, "Could not purge expired posts");
                    report.failed.push(category.remote_id);
                }
            }
        }

        if report.deleted > 0 {
            info!(deleted = report.deleted, "Expired posts removed");
        }
        report
    }
}

impl ReconciliationEngine {
    pub async fn purge_expired(&self) -> PurgeReport {
        self.expiry.purge_expired().await
    }
}
