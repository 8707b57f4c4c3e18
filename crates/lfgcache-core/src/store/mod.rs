//! Two-tier local object store.
//!
//! The foreground tier is an in-memory snapshot that readers see as soon as
//! a transaction commits. The durable tier persists that snapshot on the
//! blocking pool afterwards; losing a durable write only costs the changes
//! since the last successful one.
//!
//! Durable tiers:
//! - `JsonFileTier`: a JSON file in the cache directory
//! - `MemoryTier`: nothing leaves the process (tests, throwaway sessions)

pub mod error;
pub mod local;
pub mod tier;

pub use error::StoreError;
pub use local::{Entity, LocalKey, LocalStore, Snapshot, Stored, Transaction};
pub use tier::{CachedData, DurableTier, JsonFileTier, MemoryTier};
