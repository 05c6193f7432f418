//! Sync state persisted as a flat JSON object
//!
//! Every `set`/`remove` rewrites the whole file. An advisory lock on a
//! sidecar `.lock` file serializes writers across processes (CLI and a
//! running `finsync watch`, for example). Distinct keys are still written
//! independently.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;

use crate::domain::result::{Error, Result};
use crate::ports::StateStore;

/// Default file name inside the data directory
pub const STATE_FILE: &str = "sync-state.json";

type StateMap = BTreeMap<String, String>;

/// `StateStore` backed by a JSON file
pub struct JsonStateStore {
    path: PathBuf,
    lock_path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    guard: Mutex<()>,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);

        Self {
            path,
            lock_path,
            guard: Mutex::new(()),
        }
    }

    /// Store at `<data_dir>/sync-state.json`
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(STATE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_lock(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.lock_path)?)
    }

    fn read_map(&self) -> Result<StateMap> {
        if !self.path.exists() {
            return Ok(StateMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(StateMap::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            Error::storage(format!("Corrupt state file {}: {}", self.path.display(), e))
        })
    }

    fn write_map(&self, map: &StateMap) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(map)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut StateMap)) -> Result<()> {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| Error::storage("state file lock poisoned"))?;
        let lock = self.open_lock()?;
        lock.lock_exclusive()?;

        let result = self.read_map().and_then(|mut map| {
            f(&mut map);
            self.write_map(&map)
        });

        lock.unlock()?;
        result
    }
}

impl StateStore for JsonStateStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| Error::storage("state file lock poisoned"))?;
        let lock = self.open_lock()?;
        lock.lock_shared()?;
        let result = self.read_map().map(|map| map.get(key).cloned());
        lock.unlock()?;
        result
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|map| {
            map.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::ports::state_keys;

    #[test]
    fn test_values_persist_across_instances() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::in_dir(dir.path());

        assert_eq!(store.get(state_keys::DEVICE_ID).unwrap(), None);
        store.set(state_keys::DEVICE_ID, "abc").unwrap();
        store.set_bool(state_keys::SYNC_ENABLED, true).unwrap();

        let reopened = JsonStateStore::in_dir(dir.path());
        assert_eq!(
            reopened.get(state_keys::DEVICE_ID).unwrap().as_deref(),
            Some("abc")
        );
        assert!(reopened.get_bool(state_keys::SYNC_ENABLED).unwrap());

        reopened.remove(state_keys::SYNC_ENABLED).unwrap();
        assert!(!store.get_bool(state_keys::SYNC_ENABLED).unwrap());
    }

    #[test]
    fn test_corrupt_file_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::in_dir(dir.path());
        fs::write(store.path(), "{not json").unwrap();

        assert!(matches!(
            store.get(state_keys::DEVICE_ID),
            Err(Error::Storage(_))
        ));
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::in_dir(&dir.path().join("nested").join("data"));
        store.set(state_keys::DEVICE_NAME, "Laptop").unwrap();
        assert!(store.path().exists());
    }
}
