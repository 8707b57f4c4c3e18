use thiserror::Error;

use crate::remote::RemoteError;
use crate::store::StoreError;

/// Errors reported by the sync engine to its caller.
///
/// Record-level decode problems and durable-tier failures never show up
/// here; they are logged and the operation carries on.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote service could not be reached or rejected the request.
    /// Nothing was changed locally.
    #[error("Remote request failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    /// The foreground tier refused the commit. Settings were not updated.
    #[error("Local commit failed: {0}")]
    LocalCommit(#[from] StoreError),
}

impl SyncError {
    /// True when the failure happened before any local state was touched.
    pub fn is_remote(&self) -> bool {
        matches!(self, SyncError::Remote(_))
    }
}
