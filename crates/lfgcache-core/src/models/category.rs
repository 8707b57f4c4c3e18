use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::PostPresets;
use crate::filter::FieldSource;

/// `post_expiry_hours` value meaning posts never expire.
pub const NEVER_EXPIRES: i64 = -1;

/// A level range for a game, e.g. rank 1..=30.
/// A tier with `max == 0` is unused by the game and carries no name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelTier {
    pub min: i64,
    pub max: i64,
    pub name: Option<String>,
}

impl LevelTier {
    pub fn is_used(&self) -> bool {
        self.max != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub name: String,
    /// Owning category; not an ownership edge.
    pub category_remote_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub category_remote_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameType {
    pub name: String,
    pub category_remote_id: String,
}

/// A game that posts are grouped under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub remote_id: String,
    pub display_name: String,
    pub short_name: String,
    pub primary_level: LevelTier,
    pub secondary_level: LevelTier,
    pub post_expiry_hours: i64,
    #[serde(default)]
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub game_types: Vec<GameType>,
    #[serde(default)]
    pub presets: Option<PostPresets>,
}

impl Category {
    pub const CLASS: &'static str = "Game";

    pub fn expires(&self) -> bool {
        self.post_expiry_hours != NEVER_EXPIRES
    }

    /// Oldest `createdAt` a post may have and still be live, or `None` when
    /// posts in this category never expire. A window reaching past the
    /// representable time range has no cutoff either.
    pub fn expiry_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.expires() {
            return None;
        }
        Duration::try_hours(self.post_expiry_hours).and_then(|window| now.checked_sub_signed(window))
    }

    /// Drop all child records and rebuild them from the given names.
    pub fn replace_children(&mut self, platforms: &[String], characters: &[String], game_types: &[String]) {
        let owner = self.remote_id.clone();
        self.platforms = platforms
            .iter()
            .map(|name| Platform {
                name: name.clone(),
                category_remote_id: owner.clone(),
            })
            .collect();
        self.characters = characters
            .iter()
            .map(|name| Character {
                name: name.clone(),
                category_remote_id: owner.clone(),
            })
            .collect();
        self.game_types = game_types
            .iter()
            .map(|name| GameType {
                name: name.clone(),
                category_remote_id: owner.clone(),
            })
            .collect();
    }

    pub fn platform_names(&self) -> Vec<&str> {
        self.platforms.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn character_names(&self) -> Vec<&str> {
        self.characters.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn game_type_names(&self) -> Vec<&str> {
        self.game_types.iter().map(|g| g.name.as_str()).collect()
    }
}

impl FieldSource for Category {
    fn field(&self, name: &str) -> Option<Value> {
        let value = match name {
            "objectId" => Value::from(self.remote_id.as_str()),
            "fullName" => Value::from(self.display_name.as_str()),
            "shortName" => Value::from(self.short_name.as_str()),
            "primaryLevelMin" => Value::from(self.primary_level.min),
            "primaryLevelMax" => Value::from(self.primary_level.max),
            "primaryLevelName" => Value::from(self.primary_level.name.clone()?),
            "secondaryLevelMin" => Value::from(self.secondary_level.min),
            "secondaryLevelMax" => Value::from(self.secondary_level.max),
            "secondaryLevelName" => Value::from(self.secondary_level.name.clone()?),
            "postExpiryTime" => Value::from(self.post_expiry_hours),
            _ => return None,
        };
        Some(value)
    }
}
