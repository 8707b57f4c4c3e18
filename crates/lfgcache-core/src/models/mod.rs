//! Data models for cached LFG entities.
//!
//! - `Category`: a game, with its level tiers, expiry policy and the
//!   `Platform`/`Character`/`GameType` child records
//! - `Listing`: a post looking for players, scoped to one category
//! - `PostPresets`: the last submitted values for a category
//! - `NewListing`: a post the user is about to submit

pub mod category;
pub mod listing;
pub mod presets;

pub use category::{Category, Character, GameType, LevelTier, Platform, NEVER_EXPIRES};
pub use listing::{Listing, NewListing};
pub use presets::PostPresets;
