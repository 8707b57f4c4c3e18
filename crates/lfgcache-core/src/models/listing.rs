use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Category;
use crate::filter::{format_timestamp, FieldSource};

/// A post looking for players, as cached locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub remote_id: String,
    /// Parent category; must exist locally.
    pub category_remote_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Stable identifier of the submitting device.
    pub device_id: String,
    pub platform: String,
    pub character: String,
    pub level_tier1: i64,
    pub level_tier2: i64,
    pub description: String,
    pub type_tag: String,
    pub mic: bool,
    pub player_handle: String,
}

impl Listing {
    pub const CLASS: &'static str = "Post";
    pub const CATEGORY_FIELD: &'static str = "gameId";
    pub const CREATED_FIELD: &'static str = "createdAt";
    pub const DEVICE_FIELD: &'static str = "deviceId";

    pub fn is_expired(&self, category: &Category, now: DateTime<Utc>) -> bool {
        category
            .expiry_cutoff(now)
            .is_some_and(|cutoff| self.created_at < cutoff)
    }
}

impl FieldSource for Listing {
    fn field(&self, name: &str) -> Option<Value> {
        let value = match name {
            "objectId" => Value::from(self.remote_id.as_str()),
            "gameId" => Value::from(self.category_remote_id.as_str()),
            "createdAt" => Value::from(format_timestamp(&self.created_at)),
            "updatedAt" => Value::from(format_timestamp(&self.updated_at)),
            "deviceId" => Value::from(self.device_id.as_str()),
            "platform" => Value::from(self.platform.as_str()),
            "character" => Value::from(self.character.as_str()),
            "primaryLevel" => Value::from(self.level_tier1),
            "secondaryLevel" => Value::from(self.level_tier2),
            "description" => Value::from(self.description.as_str()),
            "gameType" => Value::from(self.type_tag.as_str()),
            "mic" => Value::from(self.mic),
            "playerId" => Value::from(self.player_handle.as_str()),
            _ => return None,
        };
        Some(value)
    }
}

/// A post the user is submitting. The server assigns id and timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewListing {
    pub category_remote_id: String,
    pub platform: String,
    pub character: String,
    pub level_tier1: i64,
    pub level_tier2: i64,
    pub description: String,
    pub type_tag: String,
    pub mic: bool,
    pub player_handle: String,
}

impl NewListing {
    /// Field map for creating the remote `Post`, including a pointer to its
    /// `Game` and the submitting device.
    pub fn remote_fields(&self, device_id: &str) -> Map<String, Value> {
        let mut pointer = Map::new();
        pointer.insert("__type".to_string(), Value::from("Pointer"));
        pointer.insert("className".to_string(), Value::from(Category::CLASS));
        pointer.insert("objectId".to_string(), Value::from(self.category_remote_id.as_str()));

        let mut fields = Map::new();
        fields.insert("platform".to_string(), Value::from(self.platform.as_str()));
        fields.insert("mic".to_string(), Value::from(self.mic));
        fields.insert("playerId".to_string(), Value::from(self.player_handle.as_str()));
        fields.insert("character".to_string(), Value::from(self.character.as_str()));
        fields.insert("primaryLevel".to_string(), Value::from(self.level_tier1));
        fields.insert("secondaryLevel".to_string(), Value::from(self.level_tier2));
        fields.insert("description".to_string(), Value::from(self.description.as_str()));
        fields.insert("gameType".to_string(), Value::from(self.type_tag.as_str()));
        fields.insert("game".to_string(), Value::Object(pointer));
        fields.insert(
            Listing::CATEGORY_FIELD.to_string(),
            Value::from(self.category_remote_id.as_str()),
        );
        fields.insert(Listing::DEVICE_FIELD.to_string(), Value::from(device_id));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use chrono::Duration;

    fn draft() -> NewListing {
        NewListing {
            category_remote_id: "G1".to_string(),
            platform: "PC".to_string(),
            character: "Warlock".to_string(),
            level_tier1: 40,
            level_tier2: 300,
            description: "Need two for raid".to_string(),
            type_tag: "Raid".to_string(),
            mic: true,
            player_handle: "guardian#1234".to_string(),
        }
    }

    #[test]
    fn test_remote_fields_carry_game_pointer_and_device() {
        let fields = draft().remote_fields("DEVICE-1");
        assert_eq!(fields["gameId"], Value::from("G1"));
        assert_eq!(fields["deviceId"], Value::from("DEVICE-1"));
        assert_eq!(fields["game"]["__type"], Value::from("Pointer"));
        assert_eq!(fields["game"]["className"], Value::from("Game"));
        assert_eq!(fields["game"]["objectId"], Value::from("G1"));
        assert_eq!(fields["primaryLevel"], Value::from(40));
        assert_eq!(fields["mic"], Value::from(true));
    }

    #[test]
    fn test_listing_fields_match_filters() {
        let now = Utc::now();
        let listing = Listing {
            remote_id: "P1".to_string(),
            category_remote_id: "G1".to_string(),
            created_at: now - Duration::minutes(30),
            updated_at: now,
            device_id: "DEVICE-1".to_string(),
            platform: "PC".to_string(),
            character: "Warlock".to_string(),
            level_tier1: 40,
            level_tier2: 300,
            description: String::new(),
            type_tag: "Raid".to_string(),
            mic: false,
            player_handle: "guardian#1234".to_string(),
        };

        let filter = Filter::new()
            .equals("gameId", "G1")
            .equals("platform", "PC")
            .at_least("createdAt", now - Duration::hours(1));
        assert!(filter.matches(&listing));
        assert!(!Filter::new().equals("mic", true).matches(&listing));
    }
}
