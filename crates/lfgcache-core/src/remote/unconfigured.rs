use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{RawObject, RemoteError, RemoteSource};
use crate::filter::Filter;

/// Source for a host with no server configured. Every call fails with
/// `RemoteError::Configuration`; cached reads and purges still work.
#[derive(Debug, Clone)]
pub struct UnconfiguredSource {
    reason: String,
}

impl UnconfiguredSource {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn error(&self) -> RemoteError {
        RemoteError::Configuration(self.reason.clone())
    }
}

#[async_trait]
impl RemoteSource for UnconfiguredSource {
    async fn find(&self, _class: &str, _filter: Option<&Filter>) -> Result<Vec<RawObject>, RemoteError> {
        Err(self.error())
    }

    async fn create(&self, _class: &str, _fields: Map<String, Value>) -> Result<String, RemoteError> {
        Err(self.error())
    }

    async fn delete_by_id(&self, _class: &str, _id: &str) -> Result<(), RemoteError> {
        Err(self.error())
    }
}
