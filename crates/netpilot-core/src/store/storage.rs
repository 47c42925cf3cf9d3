// ── Profile storage ──
//
// Opens, creates, and removes the store behind each profile identifier, and
// persists the ordered list of user profiles so the stack can be rebuilt
// at start-up.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::{JsonFileStore, Store, StoreData, StoreError};
use crate::model::ProfileIdentifier;

/// Factory for the stores backing each profile.
pub trait ProfileStorage {
    fn exists(&self, identifier: &ProfileIdentifier) -> bool;

    /// Open the store of an existing profile.
    fn open(&self, identifier: &ProfileIdentifier) -> Result<Box<dyn Store>, StoreError>;

    /// Create an empty store, failing if one already exists.
    fn create(&self, identifier: &ProfileIdentifier) -> Result<Box<dyn Store>, StoreError>;

    fn remove(&self, identifier: &ProfileIdentifier) -> Result<(), StoreError>;

    fn load_user_profile_list(&self) -> Result<Vec<ProfileIdentifier>, StoreError>;

    fn save_user_profile_list(&self, profiles: &[ProfileIdentifier]) -> Result<(), StoreError>;
}

// ── List file encoding ──────────────────────────────────────────────

fn encode_user_profile_list(profiles: &[ProfileIdentifier]) -> String {
    profiles
        .iter()
        .map(|id| {
            if id.user_hash.is_empty() {
                format!("{id}\n")
            } else {
                format!("{id} {}\n", id.user_hash)
            }
        })
        .collect()
}

fn decode_user_profile_list(text: &str) -> Vec<ProfileIdentifier> {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let raw = parts.next()?;
            match ProfileIdentifier::parse(raw) {
                Ok(mut id) if id.is_user() => {
                    id.user_hash = parts.next().unwrap_or_default().to_owned();
                    Some(id)
                }
                _ => {
                    warn!(entry = raw, "ignoring invalid user profile list entry");
                    None
                }
            }
        })
        .collect()
}

// ── In-memory storage ───────────────────────────────────────────────

#[derive(Default)]
struct MemoryInner {
    profiles: RefCell<BTreeMap<String, StoreData>>,
    user_list: RefCell<String>,
}

/// Shared in-memory storage. Clones see the same profiles.
#[derive(Clone, Default)]
pub struct MemoryProfileStorage {
    inner: Rc<MemoryInner>,
}

impl MemoryProfileStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifiers with a store, in textual order.
    pub fn profiles(&self) -> Vec<String> {
        self.inner.profiles.borrow().keys().cloned().collect()
    }
}

/// A memory store whose `flush` publishes into its parent storage.
struct MemoryBackedStore {
    key: String,
    data: StoreData,
    storage: Rc<MemoryInner>,
}

impl Store for MemoryBackedStore {
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
        self.storage
            .profiles
            .borrow_mut()
            .insert(self.key.clone(), self.data.clone());
        Ok(())
    }
}

impl ProfileStorage for MemoryProfileStorage {
    fn exists(&self, identifier: &ProfileIdentifier) -> bool {
        self.inner
            .profiles
            .borrow()
            .contains_key(&identifier.to_string())
    }

    fn open(&self, identifier: &ProfileIdentifier) -> Result<Box<dyn Store>, StoreError> {
        let key = identifier.to_string();
        let data = self
            .inner
            .profiles
            .borrow()
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::UnknownProfile {
                identifier: key.clone(),
            })?;
        Ok(Box::new(MemoryBackedStore {
            key,
            data,
            storage: Rc::clone(&self.inner),
        }))
    }

    fn create(&self, identifier: &ProfileIdentifier) -> Result<Box<dyn Store>, StoreError> {
        let key = identifier.to_string();
        {
            let mut profiles = self.inner.profiles.borrow_mut();
            if profiles.contains_key(&key) {
                return Err(StoreError::ProfileExists { identifier: key });
            }
            profiles.insert(key.clone(), StoreData::default());
        }
        Ok(Box::new(MemoryBackedStore {
            key,
            data: StoreData::default(),
            storage: Rc::clone(&self.inner),
        }))
    }

    fn remove(&self, identifier: &ProfileIdentifier) -> Result<(), StoreError> {
        let key = identifier.to_string();
        match self.inner.profiles.borrow_mut().remove(&key) {
            Some(_) => Ok(()),
            None => Err(StoreError::UnknownProfile { identifier: key }),
        }
    }

    fn load_user_profile_list(&self) -> Result<Vec<ProfileIdentifier>, StoreError> {
        Ok(decode_user_profile_list(&self.inner.user_list.borrow()))
    }

    fn save_user_profile_list(&self, profiles: &[ProfileIdentifier]) -> Result<(), StoreError> {
        *self.inner.user_list.borrow_mut() = encode_user_profile_list(profiles);
        Ok(())
    }
}

// ── On-disk storage ─────────────────────────────────────────────────

/// Profiles as JSON files under a global and a per-user directory.
///
/// - global: `<global_dir>/<name>.profile.json`
/// - user: `<user_dir>/<user>/<name>.profile.json`
#[derive(Debug, Clone)]
pub struct FileProfileStorage {
    global_dir: PathBuf,
    user_dir: PathBuf,
    user_list_path: PathBuf,
}

impl FileProfileStorage {
    pub fn new(
        global_dir: impl Into<PathBuf>,
        user_dir: impl Into<PathBuf>,
        user_list_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            global_dir: global_dir.into(),
            user_dir: user_dir.into(),
            user_list_path: user_list_path.into(),
        }
    }

    pub fn path_for(&self, identifier: &ProfileIdentifier) -> PathBuf {
        let file = format!("{}.profile.json", identifier.name);
        match &identifier.user {
            Some(user) => self.user_dir.join(user).join(file),
            None => self.global_dir.join(file),
        }
    }
}

fn write_file_atomically(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

impl ProfileStorage for FileProfileStorage {
    fn exists(&self, identifier: &ProfileIdentifier) -> bool {
        self.path_for(identifier).is_file()
    }

    fn open(&self, identifier: &ProfileIdentifier) -> Result<Box<dyn Store>, StoreError> {
        if !self.exists(identifier) {
            return Err(StoreError::UnknownProfile {
                identifier: identifier.to_string(),
            });
        }
        Ok(Box::new(JsonFileStore::open(self.path_for(identifier))?))
    }

    fn create(&self, identifier: &ProfileIdentifier) -> Result<Box<dyn Store>, StoreError> {
        if self.exists(identifier) {
            return Err(StoreError::ProfileExists {
                identifier: identifier.to_string(),
            });
        }
        let path = self.path_for(identifier);
        let mut store = JsonFileStore::open(&path)?;
        store.flush()?;
        debug!(profile = %identifier, path = %path.display(), "created profile storage");
        Ok(Box::new(store))
    }

    fn remove(&self, identifier: &ProfileIdentifier) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(identifier)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::UnknownProfile {
                identifier: identifier.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn load_user_profile_list(&self) -> Result<Vec<ProfileIdentifier>, StoreError> {
        match fs::read_to_string(&self.user_list_path) {
            Ok(text) => Ok(decode_user_profile_list(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save_user_profile_list(&self, profiles: &[ProfileIdentifier]) -> Result<(), StoreError> {
        write_file_atomically(
            &self.user_list_path,
            encode_user_profile_list(profiles).as_bytes(),
        )
    }
}
