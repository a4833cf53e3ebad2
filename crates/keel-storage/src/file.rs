//! File-backed storage: one file per key under a root directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::{Storage, StorageError};

/// Stores each key as `<root>/<sanitized-key>.json`.
///
/// Keys are sanitized to a filesystem-safe alphabet, so distinct keys that
/// sanitize identically collide; keep keys simple (`"app-state"`,
/// `"history:v1"` and the like).
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let sanitized: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{sanitized}.json"))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };
        fs::create_dir_all(&self.root).map_err(io_err)?;
        fs::write(self.path_for(key), value).map_err(io_err)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_storage() -> FileStorage {
        let dir = std::env::temp_dir().join(format!("keel-storage-{}", uuid::Uuid::new_v4()));
        FileStorage::new(dir)
    }

    #[test]
    fn test_round_trip() {
        let storage = temp_storage();
        assert_eq!(storage.get("state").unwrap(), None);

        storage.set("state", "{\"n\":1}").unwrap();
        assert_eq!(storage.get("state").unwrap().as_deref(), Some("{\"n\":1}"));

        storage.remove("state").unwrap();
        assert_eq!(storage.get("state").unwrap(), None);

        fs::remove_dir_all(storage.root()).ok();
    }

    #[test]
    fn test_keys_are_sanitized() {
        let storage = temp_storage();
        storage.set("app/state:v1", "{}").unwrap();
        assert!(storage.root().join("app_state_v1.json").exists());
        assert_eq!(storage.get("app/state:v1").unwrap().as_deref(), Some("{}"));

        fs::remove_dir_all(storage.root()).ok();
    }
}
