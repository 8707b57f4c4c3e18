//! Schema-checked decoding of raw remote objects.
//!
//! Each decoder either produces a complete typed record or a `DecodeError`;
//! a record is never applied halfway.

use thiserror::Error;

use super::RawObject;
use crate::models::{LevelTier, Listing, NEVER_EXPIRES};

const DEFAULT_PRIMARY_LEVEL_NAME: &str = "Primary Level";
const DEFAULT_SECONDARY_LEVEL_NAME: &str = "Secondary Level";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("missing field `{0}`")]
    Missing(String),

    #[error("field `{field}` is not a {expected}")]
    WrongType { field: String, expected: &'static str },

    #[error("field `{field}` has out-of-range value {value}")]
    OutOfRange { field: String, value: i64 },
}

impl DecodeError {
    pub fn wrong_type(field: &str, expected: &'static str) -> Self {
        DecodeError::WrongType {
            field: field.to_string(),
            expected,
        }
    }
}

/// A `Game` object as sent by the server, before it is merged into the
/// local `Category`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCategory {
    pub remote_id: String,
    pub display_name: String,
    pub short_name: String,
    pub primary_level: LevelTier,
    pub secondary_level: LevelTier,
    pub post_expiry_hours: i64,
    pub platforms: Vec<String>,
    pub characters: Vec<String>,
    pub game_types: Vec<String>,
}

impl RemoteCategory {
    /// Servers occasionally send a game with one child list blanked out.
    /// Children are only rebuilt from payloads where all three are present.
    pub fn has_complete_children(&self) -> bool {
        !self.platforms.is_empty() && !self.characters.is_empty() && !self.game_types.is_empty()
    }
}

fn level_tier(
    raw: &RawObject,
    min_field: &str,
    max_field: &str,
    name_field: &str,
    default_name: &str,
) -> Result<LevelTier, DecodeError> {
    let min = raw.integer(min_field)?;
    let max = raw.integer(max_field)?;
    let name = (max != 0).then(|| {
        raw.optional_string(name_field)
            .unwrap_or(default_name)
            .to_string()
    });
    Ok(LevelTier { min, max, name })
}

/// Hours, or `-1` for never. Any other negative value is rejected.
fn post_expiry_hours(raw: &RawObject) -> Result<i64, DecodeError> {
    let hours = raw.integer("postExpiryTime")?;
    if hours < NEVER_EXPIRES {
        return Err(DecodeError::OutOfRange {
            field: "postExpiryTime".to_string(),
            value: hours,
        });
    }
    Ok(hours)
}

pub fn decode_category(raw: &RawObject) -> Result<RemoteCategory, DecodeError> {
    Ok(RemoteCategory {
        remote_id: raw.object_id()?.to_string(),
        display_name: raw.string("fullName")?.to_string(),
        short_name: raw.string("shortName")?.to_string(),
        primary_level: level_tier(
            raw,
            "primaryLevelMin",
            "primaryLevelMax",
            "primaryLevelName",
            DEFAULT_PRIMARY_LEVEL_NAME,
        )?,
        secondary_level: level_tier(
            raw,
            "secondaryLevelMin",
            "secondaryLevelMax",
            "secondaryLevelName",
            DEFAULT_SECONDARY_LEVEL_NAME,
        )?,
        post_expiry_hours: post_expiry_hours(raw)?,
        platforms: raw.string_list("platforms")?,
        characters: raw.string_list("characters")?,
        game_types: raw.string_list("playlist")?,
    })
}

pub fn decode_listing(raw: &RawObject) -> Result<Listing, DecodeError> {
    Ok(Listing {
        remote_id: raw.object_id()?.to_string(),
        category_remote_id: raw.string(Listing::CATEGORY_FIELD)?.to_string(),
        created_at: raw.timestamp(Listing::CREATED_FIELD)?,
        updated_at: raw.timestamp("updatedAt")?,
        device_id: raw.string(Listing::DEVICE_FIELD)?.to_string(),
        platform: raw.string("platform")?.to_string(),
        character: raw.string("character")?.to_string(),
        level_tier1: raw.integer("primaryLevel")?,
        level_tier2: raw.integer("secondaryLevel")?,
        description: raw.string("description")?.to_string(),
        type_tag: raw.string("gameType")?.to_string(),
        mic: raw.boolean("mic")?,
        player_handle: raw.string("playerId")?.to_string(),
    })
}
