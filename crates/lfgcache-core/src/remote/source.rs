use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{DecodeError, RemoteError};
use crate::filter::{timestamp_of, FieldSource, Filter};

/// Query/mutate access to the remote object service.
///
/// Every call is a single request (or a paged series of them); nothing is
/// coalesced or retried at this level beyond transport backoff.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// All objects of `class` matching `filter` (everything when `None`).
    async fn find(&self, class: &str, filter: Option<&Filter>) -> Result<Vec<RawObject>, RemoteError>;

    /// Create an object and return its server-assigned id.
    async fn create(&self, class: &str, fields: Map<String, Value>) -> Result<String, RemoteError>;

    async fn delete_by_id(&self, class: &str, id: &str) -> Result<(), RemoteError>;
}

/// A remote object as returned by the service: field name to JSON value.
/// Fields must be pulled out through the type-checked accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawObject(Map<String, Value>);

impl RawObject {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn object_id(&self) -> Result<&str, DecodeError> {
        self.string("objectId")
    }

    fn require(&self, field: &str) -> Result<&Value, DecodeError> {
        match self.0.get(field) {
            None | Some(Value::Null) => Err(DecodeError::Missing(field.to_string())),
            Some(value) => Ok(value),
        }
    }

    pub fn string(&self, field: &str) -> Result<&str, DecodeError> {
        self.require(field)?
            .as_str()
            .ok_or_else(|| DecodeError::wrong_type(field, "string"))
    }

    /// Present and a string, otherwise `None`.
    pub fn optional_string(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Whole number. Integral floats are accepted since some clients store
    /// numbers as doubles.
    pub fn integer(&self, field: &str) -> Result<i64, DecodeError> {
        let value = self.require(field)?;
        value
            .as_i64()
            .or_else(|| {
                value
                    .as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
            .ok_or_else(|| DecodeError::wrong_type(field, "integer"))
    }

    pub fn boolean(&self, field: &str) -> Result<bool, DecodeError> {
        self.require(field)?
            .as_bool()
            .ok_or_else(|| DecodeError::wrong_type(field, "boolean"))
    }

    /// Array whose every element is a string.
    pub fn string_list(&self, field: &str) -> Result<Vec<String>, DecodeError> {
        let items = self
            .require(field)?
            .as_array()
            .ok_or_else(|| DecodeError::wrong_type(field, "array of strings"))?;
        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| DecodeError::wrong_type(field, "array of strings"))
            })
            .collect()
    }

    pub fn timestamp(&self, field: &str) -> Result<DateTime<Utc>, DecodeError> {
        timestamp_of(self.require(field)?).ok_or_else(|| DecodeError::wrong_type(field, "date"))
    }
}

impl FieldSource for RawObject {
    fn field(&self, name: &str) -> Option<Value> {
        self.0.get(name).cloned()
    }
}
