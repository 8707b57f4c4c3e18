//! Field predicates shared by remote queries and local lookups.
//!
//! A `Filter` is a conjunction of constraints over named fields. The same
//! filter is rendered as a Parse `where` clause for the remote service and
//! evaluated in memory against local records, so both sides agree on which
//! objects are in scope. Local records and raw remote objects expose their
//! fields under the remote field names through `FieldSource`.

use std::cmp::Ordering;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Anything whose fields can be looked up by their remote name.
pub trait FieldSource {
    fn field(&self, name: &str) -> Option<Value>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Equals { field: String, value: Value },
    /// Inclusive lower bound on a timestamp field.
    AtLeast { field: String, time: DateTime<Utc> },
    /// Exclusive upper bound on a timestamp field.
    Before { field: String, time: DateTime<Utc> },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    constraints: Vec<Constraint>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equals(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constraints.push(Constraint::Equals {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn at_least(mut self, field: impl Into<String>, time: DateTime<Utc>) -> Self {
        self.constraints.push(Constraint::AtLeast {
            field: field.into(),
            time,
        });
        self
    }

    pub fn before(mut self, field: impl Into<String>, time: DateTime<Utc>) -> Self {
        self.constraints.push(Constraint::Before {
            field: field.into(),
            time,
        });
        self
    }

    /// Append every constraint of `other`.
    pub fn and(mut self, other: &Filter) -> Self {
        self.constraints.extend(other.constraints.iter().cloned());
        self
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Evaluate the filter against a record. An empty filter matches everything.
    pub fn matches<S: FieldSource + ?Sized>(&self, source: &S) -> bool {
        self.constraints.iter().all(|constraint| match constraint {
            Constraint::Equals { field, value } => source.field(field).as_ref() == Some(value),
            Constraint::AtLeast { field, time } => source
                .field(field)
                .and_then(|v| timestamp_of(&v))
                .is_some_and(|t| t >= *time),
            Constraint::Before { field, time } => source
                .field(field)
                .and_then(|v| timestamp_of(&v))
                .is_some_and(|t| t < *time),
        })
    }

    /// Render as a Parse REST `where` clause.
    pub fn to_where(&self) -> Value {
        let mut clause = Map::new();
        for constraint in &self.constraints {
            match constraint {
                Constraint::Equals { field, value } => {
                    clause.insert(field.clone(), value.clone());
                }
                Constraint::AtLeast { field, time } => {
                    insert_operator(&mut clause, field, "$gte", date_value(time));
                }
                Constraint::Before { field, time } => {
                    insert_operator(&mut clause, field, "$lt", date_value(time));
                }
            }
        }
        Value::Object(clause)
    }
}

fn insert_operator(clause: &mut Map<String, Value>, field: &str, op: &str, operand: Value) {
    let entry = clause
        .entry(field.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    // An equality on the same field wins over a range
    if let Value::Object(ops) = entry {
        ops.insert(op.to_string(), operand);
    }
}

/// Parse `Date` wire representation.
pub fn date_value(time: &DateTime<Utc>) -> Value {
    let mut date = Map::new();
    date.insert("__type".to_string(), Value::from("Date"));
    date.insert("iso".to_string(), Value::from(format_timestamp(time)));
    Value::Object(date)
}

/// Canonical timestamp text used for local fields. Fixed width, so it
/// also sorts lexically.
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Read a timestamp from either an RFC 3339 string or a Parse `Date` object.
pub fn timestamp_of(value: &Value) -> Option<DateTime<Utc>> {
    let text = match value {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("iso")?.as_str()?,
        _ => return None,
    };
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Ordering for local query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub ascending: bool,
}

impl Sort {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }

    pub fn compare<S: FieldSource + ?Sized>(&self, a: &S, b: &S) -> Ordering {
        let ord = compare_values(a.field(&self.field), b.field(&self.field));
        if self.ascending {
            ord
        } else {
            ord.reverse()
        }
    }
}

fn compare_values(a: Option<Value>, b: Option<Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(&y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(&y),
        _ => Ordering::Equal,
    }
}
