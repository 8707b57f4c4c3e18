//! lfgcache core library.
//!
//! Mirrors a remote listings service (games and their posts) into a local
//! two-tier cache and keeps the two in sync:
//!
//! - `remote`: the `RemoteSource` seam, typed decoding of raw objects and
//!   the Parse REST client
//! - `store`: the foreground/durable `LocalStore`
//! - `sync`: identity index, reconciliation engine, expiry, presets and
//!   the submission flow
//! - `settings`: persisted sync bookkeeping and the device identifier
//! - `config`: server and cache location configuration

pub mod config;
pub mod error;
pub mod filter;
pub mod models;
pub mod remote;
pub mod settings;
pub mod store;
pub mod sync;
pub mod utils;

pub use config::Config;
pub use error::SyncError;
pub use filter::{Filter, Sort};
pub use models::{Category, Listing, NewListing, PostPresets};
pub use remote::{ParseClient, RawObject, RemoteError, RemoteSource, UnconfiguredSource};
pub use settings::SettingsStore;
pub use store::{JsonFileTier, LocalStore, MemoryTier, StoreError};
pub use sync::{PurgeReport, ReconciliationEngine};
