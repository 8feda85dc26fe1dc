// src/storage/local.rs
use log::{debug, warn};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const LANGUAGE: &str = "language";
pub const THEME: &str = "theme";
pub const ADMIN_SESSION: &str = "admin_session";
pub const LAST_VIEWED_ANNOUNCEMENT: &str = "last_viewed_announcement";
pub const FALLBACK_TICKETS: &str = "fallback_tickets";
pub const FALLBACK_REPLIES: &str = "fallback_replies";
pub const PENDING_STATUSES: &str = "pending_statuses";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to write {0}: {1}")]
    Write(PathBuf, std::io::Error),
    #[error("Failed to encode value for '{0}': {1}")]
    Encode(String, serde_json::Error),
}

/// Device-local key/value state, kept as one JSON object on disk.
///
/// Every mutation rewrites the whole file through a temp file and a rename.
/// Nothing coordinates with other processes: the last writer wins.
pub struct LocalStorage {
    path: Option<PathBuf>,
    data: Mutex<Map<String, Value>>,
}

impl LocalStorage {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let data = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Map<String, Value>>(&bytes) {
                Ok(map) => map,
                Err(e) => {
                    warn!("Ignoring unreadable local storage {}: {}", path.display(), e);
                    Map::new()
                }
            },
            Err(_) => Map::new(),
        };
        debug!("Opened local storage {} with {} keys", path.display(), data.len());
        Self {
            path: Some(path),
            data: Mutex::new(data),
        }
    }

    /// Storage that never touches disk.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: Mutex::new(Map::new()),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let data = self.data.lock();
        let value = data.get(key)?.clone();
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Local storage key '{}' has unexpected shape: {}", key, e);
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let value = serde_json::to_value(value).map_err(|e| StorageError::Encode(key.to_string(), e))?;
        let mut data = self.data.lock();
        data.insert(key.to_string(), value);
        self.flush(&data)
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut data = self.data.lock();
        if data.remove(key).is_some() {
            self.flush(&data)?;
        }
        Ok(())
    }

    /// Read-modify-write of one value under one lock. A missing or
    /// unreadable value starts from `T::default()`.
    pub fn update<T, F>(&self, key: &str, f: F) -> Result<T, StorageError>
    where
        T: Default + Serialize + DeserializeOwned,
        F: FnOnce(&mut T),
    {
        let mut data = self.data.lock();
        let mut current: T = data
            .get(key)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        f(&mut current);
        let value = serde_json::to_value(&current).map_err(|e| StorageError::Encode(key.to_string(), e))?;
        data.insert(key.to_string(), value);
        self.flush(&data)?;
        Ok(current)
    }

    pub fn update_list<T, F>(&self, key: &str, f: F) -> Result<Vec<T>, StorageError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut Vec<T>),
    {
        self.update::<Vec<T>, _>(key, f)
    }

    fn flush(&self, data: &Map<String, Value>) -> Result<(), StorageError> {
        let path = match &self.path {
            Some(p) => p,
            None => return Ok(()),
        };
        let bytes = serde_json::to_vec_pretty(data).map_err(|e| StorageError::Encode("*".into(), e))?;
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(|e| StorageError::Write(dir.to_path_buf(), e))?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).map_err(|e| StorageError::Write(tmp.clone(), e))?;
        fs::rename(&tmp, path).map_err(|e| StorageError::Write(path.clone(), e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("local.json");

        let storage = LocalStorage::open(&path);
        storage.set(LANGUAGE, &"fr").unwrap();
        storage.set(THEME, &"light").unwrap();
        storage.remove(THEME).unwrap();

        let reopened = LocalStorage::open(&path);
        assert_eq!(reopened.get::<String>(LANGUAGE).as_deref(), Some("fr"));
        assert!(reopened.get::<String>(THEME).is_none());
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        fs::write(&path, b"{not json").unwrap();

        let storage = LocalStorage::open(&path);
        assert!(storage.get::<String>(LANGUAGE).is_none());
    }

    #[test]
    fn update_list_appends() {
        let storage = LocalStorage::in_memory();
        storage.update_list::<u32, _>("nums", |l| l.push(1)).unwrap();
        let list = storage.update_list::<u32, _>("nums", |l| l.push(2)).unwrap();
        assert_eq!(list, vec![1, 2]);
        assert_eq!(storage.get::<Vec<u32>>("nums"), Some(vec![1, 2]));
    }

    #[test]
    fn update_starts_from_default() {
        let storage = LocalStorage::in_memory();
        storage.set("counts", &"not a map").unwrap();
        let map = storage
            .update::<std::collections::HashMap<String, u32>, _>("counts", |m| {
                m.insert("open".into(), 3);
            })
            .unwrap();
        assert_eq!(map.get("open"), Some(&3));
        assert_eq!(storage.get::<std::collections::HashMap<String, u32>>("counts").unwrap().len(), 1);
    }
}
