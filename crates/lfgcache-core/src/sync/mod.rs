//! Reconciliation between the remote source and the local store.

pub mod engine;
pub mod expiry;
pub mod identity;
pub mod presets;
pub mod submission;

pub use engine::ReconciliationEngine;
pub use expiry::{ExpiryScheduler, PurgeReport};
pub use identity::IdentityIndex;
pub use presets::PresetRecorder;
