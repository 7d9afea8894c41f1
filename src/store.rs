//! In-memory key/value store mirrored to the backend on every flush
//!
//! Values are kept as [`serde_json::Value`], the tagged union produced by the
//! wire format (null, bool, number, string, array, object). Typed access goes
//! through [`Store::get_as`], which re-materializes a value into the caller's
//! type and reports conversion failures instead of panicking.

use crate::error::PersistError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Reserved key holding the RFC 3339 UTC time of the last flush
pub const LAST_SAVE_KEY: &str = "__last_save_time";

/// Convert a caller value into its stored representation
///
/// Fails for values the wire format cannot hold, such as maps with
/// non-string keys.
pub fn encode_value<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<Value, PersistError> {
    serde_json::to_value(value).map_err(|source| PersistError::Conversion {
        key: key.to_string(),
        source,
    })
}

/// Mapping from logical key to stored value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Store {
    entries: Map<String, Value>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(entries: Map<String, Value>) -> Self {
        Self { entries }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.entries
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.entries
    }

    /// Insert or replace a value, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Re-materialize the value under `key` as `T`
    ///
    /// Returns `Ok(None)` when the key is absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PersistError> {
        let Some(value) = self.entries.get(key) else {
            return Ok(None);
        };

        T::deserialize(value)
            .map(Some)
            .map_err(|source| PersistError::Conversion {
                key: key.to_string(),
                source,
            })
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries, including the reserved timestamp if present
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// User keys, without the reserved timestamp key
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries
            .keys()
            .map(String::as_str)
            .filter(|key| *key != LAST_SAVE_KEY)
    }

    /// Record a flush time under the reserved key
    pub fn stamp(&mut self, at: DateTime<Utc>) {
        self.entries
            .insert(LAST_SAVE_KEY.to_string(), Value::String(at.to_rfc3339()));
    }

    /// Time of the last flush, if one was recorded and is readable
    pub fn last_save_time(&self) -> Option<DateTime<Utc>> {
        let raw = self.entries.get(LAST_SAVE_KEY)?.as_str()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|at| at.with_timezone(&Utc))
    }
}
