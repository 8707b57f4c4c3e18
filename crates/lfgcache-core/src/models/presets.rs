use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::NewListing;

/// Values of the last post submitted for a category, kept so the next post
/// form can be pre-filled. Always replaced as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostPresets {
    pub category_remote_id: String,
    pub platform: String,
    pub character: String,
    pub level_tier1: i64,
    pub level_tier2: i64,
    pub description: String,
    pub type_tag: String,
    pub mic: bool,
    pub player_handle: String,
    pub created_at: DateTime<Utc>,
}

impl PostPresets {
    pub fn from_submission(listing: &NewListing, at: DateTime<Utc>) -> Self {
        Self {
            category_remote_id: listing.category_remote_id.clone(),
            platform: listing.platform.clone(),
            character: listing.character.clone(),
            level_tier1: listing.level_tier1,
            level_tier2: listing.level_tier2,
            description: listing.description.clone(),
            type_tag: listing.type_tag.clone(),
            mic: listing.mic,
            player_handle: listing.player_handle.clone(),
            created_at: at,
        }
    }

    /// A new post pre-filled with these values.
    pub fn to_draft(&self) -> NewListing {
        NewListing {
            category_remote_id: self.category_remote_id.clone(),
            platform: self.platform.clone(),
            character: self.character.clone(),
            level_tier1: self.level_tier1,
            level_tier2: self.level_tier2,
            description: self.description.clone(),
            type_tag: self.type_tag.clone(),
            mic: self.mic,
            player_handle: self.player_handle.clone(),
        }
    }
}
