//! Remote command boundary.
//!
//! Every create/update/connect/disconnect/delete/query is one named remote
//! operation taking a flat parameter object and answering with either a single
//! record or a sequence of records.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// One structured object as returned by the remote side, keyed by attribute name.
pub type Record = Map<String, Value>;

/// Attribute names the caller wants back in the reply.
pub const RETURN_FIELDS: &str = "_return_fields";
/// Nesting depth hint for reply serialisation.
pub const JSON_DEPTH: &str = "_json_depth";
/// Narrows the reply server-side to the object carrying this identity.
pub const IDENTITY: &str = "_identity";

/// Returns true for keys interpreted by the transport rather than passed on.
pub fn is_control_key(key: &str) -> bool {
    key.starts_with('_')
}

/// Parameters for a remote operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Record);

impl Params {
    pub fn new() -> Self {
        Self(Record::new())
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Adds the parameter only when a value is present.
    pub fn with_opt<V: Into<Value>>(mut self, key: &str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.set(key, value);
        }
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Layers `other` on top of `self`; keys in `other` win.
    pub fn merge(mut self, other: Params) -> Self {
        self.0.extend(other.0);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_record(self) -> Record {
        self.0
    }

    /// Human readable `key=value` rendering used in error messages.
    pub fn describe(&self) -> String {
        self.0
            .iter()
            .filter(|(k, _)| !is_control_key(k))
            .map(|(k, v)| match v {
                Value::String(s) => format!("{}={}", k, s),
                other => format!("{}={}", k, other),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl From<Record> for Params {
    fn from(record: Record) -> Self {
        Self(record)
    }
}

/// Reply of a remote operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Single(Record),
    Many(Vec<Record>),
}

impl Reply {
    /// Interprets a decoded JSON document as a reply.
    ///
    /// `null` is an empty sequence; anything that is neither an object nor an
    /// array of objects is a transport error.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Reply::Many(Vec::new())),
            Value::Object(record) => Ok(Reply::Single(record)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(record) => Ok(record),
                    other => Err(Error::Transport(format!(
                        "expected an object in reply sequence, got {}",
                        other
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(Reply::Many),
            other => Err(Error::Transport(format!(
                "expected an object or a sequence, got {}",
                other
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Reply::Many(records) if records.is_empty())
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            Reply::Single(record) => vec![record],
            Reply::Many(records) => records,
        }
    }

    /// Collapses the reply to the one record describing the affected object.
    ///
    /// A single record is taken as-is. In a sequence the record whose `id`
    /// matches `identity` is chosen when an identity is known, otherwise the
    /// last record (the most recently affected object surfaces last).
    pub fn select(self, identity: Option<&str>) -> Option<Record> {
        match self {
            Reply::Single(record) => Some(record),
            Reply::Many(mut records) => match identity {
                Some(id) => records
                    .into_iter()
                    .find(|record| record_identity(record) == Some(id)),
                None => records.pop(),
            },
        }
    }
}

/// Identity carried by a remote record.
pub fn record_identity(record: &Record) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

/// Executes named remote operations.
///
/// Implementations own connectivity, retries and serialisation; callers see
/// either a reply or an error.
#[async_trait]
pub trait RemoteInvoker: Send + Sync {
    async fn invoke(&self, operation: &str, params: Params) -> Result<Reply>;
}
