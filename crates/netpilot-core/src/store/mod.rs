// ── Persistent store collaborators ──
//
// The core only talks to storage through the narrow `Store` interface:
// groups of key/value pairs, one group per service or device. Encoding and
// placement belong to the implementations.

mod file;
mod storage;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use file::JsonFileStore;
pub use storage::{FileProfileStorage, MemoryProfileStorage, ProfileStorage};

/// Errors raised by store and profile-storage implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("profile storage for '{identifier}' does not exist")]
    UnknownProfile { identifier: String },

    #[error("profile storage for '{identifier}' already exists")]
    ProfileExists { identifier: String },

    #[error("malformed store {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode store: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Key/value groups backing one profile.
pub trait Store {
    fn load(&self, group: &str, key: &str) -> Option<Value>;
    fn save(&mut self, group: &str, key: &str, value: Value);
    fn delete_key(&mut self, group: &str, key: &str) -> bool;
    fn contains_group(&self, group: &str) -> bool;
    fn groups(&self) -> Vec<String>;
    fn delete_group(&mut self, group: &str) -> bool;
    /// Persist pending changes. A no-op for in-memory stores.
    fn flush(&mut self) -> Result<(), StoreError>;

    fn load_string(&self, group: &str, key: &str) -> Option<String> {
        match self.load(group, key)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn load_bool(&self, group: &str, key: &str) -> Option<bool> {
        self.load(group, key)?.as_bool()
    }

    fn load_i64(&self, group: &str, key: &str) -> Option<i64> {
        self.load(group, key)?.as_i64()
    }
}

/// In-memory group map, shared by every store implementation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct StoreData {
    groups: BTreeMap<String, BTreeMap<String, Value>>,
}

impl StoreData {
    fn load(&self, group: &str, key: &str) -> Option<Value> {
        self.groups.get(group)?.get(key).cloned()
    }

    fn save(&mut self, group: &str, key: &str, value: Value) -> bool {
        let entries = self.groups.entry(group.to_owned()).or_default();
        entries.insert(key.to_owned(), value.clone()) != Some(value)
    }

    fn delete_key(&mut self, group: &str, key: &str) -> bool {
        self.groups
            .get_mut(group)
            .is_some_and(|entries| entries.remove(key).is_some())
    }

    fn delete_group(&mut self, group: &str) -> bool {
        self.groups.remove(group).is_some()
    }
}

/// A store that never touches disk. Backs the ephemeral profile and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: StoreData,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn load(&self, group: &str, key: &str) -> Option<Value> {
        self.data.load(group, key)
    }

    fn save(&mut self, group: &str, key: &str, value: Value) {
        self.data.save(group, key, value);
    }

    fn delete_key(&mut self, group: &str, key: &str) -> bool {
        self.data.delete_key(group, key)
    }

    fn contains_group(&self, group: &str) -> bool {
        self.data.groups.contains_key(group)
    }

    fn groups(&self) -> Vec<String> {
        self.data.groups.keys().cloned().collect()
    }

    fn delete_group(&mut self, group: &str) -> bool {
        self.data.delete_group(group)
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}
