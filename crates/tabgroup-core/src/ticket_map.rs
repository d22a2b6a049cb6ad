//! Ticket → group cache.
//!
//! Advisory only: an entry can point at a group the user has since closed.
//! The live group list on the platform is the source of truth; the
//! reconciler evicts entries whose handle is rejected.
//!
//! Stored as a JSON array of `[key, handle]` pairs, e.g.
//! `[["ABC-123", 4], ["XYZ-9", 11]]`.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::types::GroupHandle;

/// Storage key the map is persisted under.
pub const STORAGE_KEY: &str = "ticketGroupMap";

#[derive(Debug, Error)]
pub enum MapDecodeError {
    #[error("stored ticket map is not an array of [key, handle] pairs: {0}")]
    Shape(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketGroupMap {
    entries: BTreeMap<String, GroupHandle>,
}

impl TicketGroupMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<GroupHandle> {
        self.entries.get(key).copied()
    }

    /// Insert or replace. Returns the previous handle for `key`.
    pub fn insert(&mut self, key: impl Into<String>, handle: GroupHandle) -> Option<GroupHandle> {
        self.entries.insert(key.into(), handle)
    }

    pub fn remove(&mut self, key: &str) -> Option<GroupHandle> {
        self.entries.remove(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, GroupHandle)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Encode for storage, pairs in key order.
    pub fn to_storage_value(&self) -> Value {
        Value::Array(
            self.entries
                .iter()
                .map(|(k, v)| Value::Array(vec![Value::from(k.as_str()), Value::from(v.0)]))
                .collect(),
        )
    }

    /// Decode a stored value. A later pair for the same key replaces an
    /// earlier one.
    pub fn from_storage_value(value: Value) -> Result<Self, MapDecodeError> {
        let pairs: Vec<(String, GroupHandle)> = serde_json::from_value(value)?;
        Ok(pairs.into_iter().collect())
    }

    /// Decode what the store returned for [`STORAGE_KEY`]; absent means empty.
    pub fn from_stored(value: Option<Value>) -> Result<Self, MapDecodeError> {
        match value {
            None | Some(Value::Null) => Ok(Self::new()),
            Some(v) => Self::from_storage_value(v),
        }
    }
}

impl FromIterator<(String, GroupHandle)> for TicketGroupMap {
    fn from_iter<I: IntoIterator<Item = (String, GroupHandle)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
