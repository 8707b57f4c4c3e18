use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Duplicate {entity} with remote id {remote_id}")]
    Duplicate {
        entity: &'static str,
        remote_id: String,
    },

    #[error("Listing {remote_id} references unknown category {category_remote_id}")]
    Orphan {
        remote_id: String,
        category_remote_id: String,
    },

    #[error("Store changed since the transaction began (generation {expected}, now {found})")]
    Conflict { expected: u64, found: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Durable tier unavailable: {0}")]
    Unavailable(String),

    #[error("Background write task failed: {0}")]
    Background(String),
}
