//! Directory-backed store: one `<key>.json` file per key

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::KeyValueStore;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::PersistenceRead(e.to_string())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| Error::PersistenceWrite(e.to_string()))?;

        // Write to a sibling temp file then rename so readers never see a torn snapshot
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        fs::write(&tmp, value).map_err(|e| Error::PersistenceWrite(e.to_string()))?;
        fs::rename(&tmp, &path).map_err(|e| Error::PersistenceWrite(e.to_string()))?;

        debug!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_key_is_none() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert_eq!(store.get("absent").unwrap(), None);
    }

    #[test]
    fn test_set_creates_directory() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("data"));

        store.set("state", r#"{"balance":1}"#).unwrap();

        assert!(store.path_for("state").exists());
        assert_eq!(
            store.get("state").unwrap().as_deref(),
            Some(r#"{"balance":1}"#)
        );
    }

    #[test]
    fn test_set_overwrites() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        store.set("state", "first").unwrap();
        store.set("state", "second").unwrap();

        assert_eq!(store.get("state").unwrap().as_deref(), Some("second"));
        assert!(!dir.path().join(".state.json.tmp").exists());
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = tempdir().unwrap();
        // A regular file where the directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let store = JsonFileStore::new(&blocker);

        let err = store.set("state", "{}").unwrap_err();
        assert!(matches!(err, Error::PersistenceWrite(_)));
    }
}
