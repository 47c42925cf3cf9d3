// ── JSON file store ──
//
// One JSON document per profile. Writes go to a temporary file in the same
// directory and are renamed over the target.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;

use super::{Store, StoreData, StoreError};

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    data: StoreData,
    dirty: bool,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => StoreData::default(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Malformed {
                path: path.display().to_string(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            data,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomically(&self) -> Result<(), StoreError> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let mut tmp = NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut tmp, &self.data)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        debug!(path = %self.path.display(), "store flushed");
        Ok(())
    }
}

impl Store for JsonFileStore {
    fn load(&self, group: &str, key: &str) -> Option<Value> {
        self.data.load(group, key)
    }

    fn save(&mut self, group: &str, key: &str, value: Value) {
        if self.data.save(group, key, value) {
            self.dirty = true;
        }
    }

    fn delete_key(&mut self, group: &str, key: &str) -> bool {
        let removed = self.data.delete_key(group, key);
        self.dirty |= removed;
        removed
    }

    fn contains_group(&self, group: &str) -> bool {
        self.data.groups.contains_key(group)
    }

    fn groups(&self) -> Vec<String> {
        self.data.groups.keys().cloned().collect()
    }

    fn delete_group(&mut self, group: &str) -> bool {
        let removed = self.data.delete_group(group);
        self.dirty |= removed;
        removed
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        if !self.dirty && self.path.exists() {
            return Ok(());
        }
        self.write_atomically()?;
        self.dirty = false;
        Ok(())
    }
}
