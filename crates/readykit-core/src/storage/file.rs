use std::path::{Path, PathBuf};

use tracing::debug;

use super::{validate_key, KeyValueStore, StorageError};

/// One JSON file per key.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path(key)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(&path)?))
    }

    fn save(&self, key: &str, contents: &str) -> Result<(), StorageError> {
        let path = self.path(key)?;
        // Write to a sibling and rename so readers never see a torn file
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &path)?;
        debug!(key = key, bytes = contents.len(), "Saved key");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_replaces_value() {
        let tmp = tempdir().expect("tempdir");
        let store = JsonFileStore::new(tmp.path().join("kv")).unwrap();

        assert!(store.load("faqs").unwrap().is_none());
        store.save("faqs", "[1]").unwrap();
        store.save("faqs", "[2]").unwrap();
        assert_eq!(store.load("faqs").unwrap().as_deref(), Some("[2]"));
        assert!(tmp.path().join("kv").join("faqs.json").exists());
        assert!(!tmp.path().join("kv").join("faqs.json.tmp").exists());
    }

    #[test]
    fn test_rejects_path_keys() {
        let tmp = tempdir().expect("tempdir");
        let store = JsonFileStore::new(tmp.path().to_path_buf()).unwrap();
        assert!(matches!(
            store.save("../escape", "x"),
            Err(StorageError::InvalidKey(_))
        ));
    }
}
