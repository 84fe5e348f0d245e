//! Storage for named cache generations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::generation::CachedResponse;
use crate::storage::StorageError;
use crate::transport::ResponseType;

/// Generation names become directory names. Version tags such as
/// `readykit-v1.2` are allowed; separators and `.`/`..` are not.
pub fn validate_generation_name(name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(name.to_string()))
    }
}

/// Named generations of URL → response entries. One entry per URL: `put`
/// replaces whatever was stored for that URL before.
pub trait CacheStorage: Send + Sync {
    /// Names of every generation present.
    fn names(&self) -> Result<Vec<String>, StorageError>;

    /// Create the generation if it does not exist yet.
    fn open(&self, name: &str) -> Result<(), StorageError>;

    /// Returns whether a generation was actually removed.
    fn delete(&self, name: &str) -> Result<bool, StorageError>;

    fn get(&self, name: &str, url: &str) -> Result<Option<CachedResponse>, StorageError>;

    fn put(&self, name: &str, entry: CachedResponse) -> Result<(), StorageError>;

    fn put_all(&self, name: &str, entries: Vec<CachedResponse>) -> Result<(), StorageError> {
        for entry in entries {
            self.put(name, entry)?;
        }
        Ok(())
    }

    fn entries(&self, name: &str) -> Result<Vec<CachedResponse>, StorageError>;
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
pub struct MemoryCacheStorage {
    generations: Mutex<BTreeMap<String, BTreeMap<String, CachedResponse>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, BTreeMap<String, CachedResponse>>> {
        self.generations.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn names(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.lock().keys().cloned().collect())
    }

    fn open(&self, name: &str) -> Result<(), StorageError> {
        validate_generation_name(name)?;
        self.lock().entry(name.to_string()).or_default();
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.lock().remove(name).is_some())
    }

    fn get(&self, name: &str, url: &str) -> Result<Option<CachedResponse>, StorageError> {
        Ok(self.lock().get(name).and_then(|g| g.get(url)).cloned())
    }

    fn put(&self, name: &str, entry: CachedResponse) -> Result<(), StorageError> {
        validate_generation_name(name)?;
        self.lock()
            .entry(name.to_string())
            .or_default()
            .insert(entry.url.clone(), entry);
        Ok(())
    }

    fn entries(&self, name: &str) -> Result<Vec<CachedResponse>, StorageError> {
        Ok(self
            .lock()
            .get(name)
            .map(|g| g.values().cloned().collect())
            .unwrap_or_default())
    }
}

// ============================================================================
// Filesystem
// ============================================================================

/// Generation index file name
const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    file: String,
    status: u16,
    response_type: ResponseType,
    content_type: Option<String>,
    cached_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GenerationIndex {
    next_file: u64,
    entries: BTreeMap<String, EntryMeta>,
}

/// Each generation is a directory holding `index.json` plus one body file
/// per entry.
pub struct FsCacheStorage {
    root: PathBuf,
    // Serializes index read-modify-write within this process
    write_lock: Mutex<()>,
}

impl FsCacheStorage {
    pub fn new(root: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generation_dir(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_generation_name(name)?;
        Ok(self.root.join(name))
    }

    fn load_index(&self, dir: &Path) -> Result<GenerationIndex, StorageError> {
        let path = dir.join(INDEX_FILE);
        if !path.exists() {
            return Ok(GenerationIndex::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save_index(&self, dir: &Path, index: &GenerationIndex) -> Result<(), StorageError> {
        let path = dir.join(INDEX_FILE);
        let tmp = dir.join(format!("{}.tmp", INDEX_FILE));
        std::fs::write(&tmp, serde_json::to_string_pretty(index)?)?;
        std::fs::rename(tmp, path)?;
        Ok(())
    }

    fn write_entry(
        &self,
        dir: &Path,
        index: &mut GenerationIndex,
        entry: CachedResponse,
    ) -> Result<(), StorageError> {
        let file = match index.entries.get(&entry.url) {
            Some(existing) => existing.file.clone(),
            None => {
                index.next_file += 1;
                format!("{:06}.bin", index.next_file)
            }
        };
        std::fs::write(dir.join(&file), &entry.body)?;
        index.entries.insert(
            entry.url,
            EntryMeta {
                file,
                status: entry.status,
                response_type: entry.response_type,
                content_type: entry.content_type,
                cached_at: entry.cached_at,
            },
        );
        Ok(())
    }

    fn read_entry(&self, dir: &Path, url: &str, meta: &EntryMeta) -> Result<CachedResponse, StorageError> {
        Ok(CachedResponse {
            url: url.to_string(),
            status: meta.status,
            response_type: meta.response_type,
            content_type: meta.content_type.clone(),
            body: std::fs::read(dir.join(&meta.file))?,
            cached_at: meta.cached_at,
        })
    }
}

impl CacheStorage for FsCacheStorage {
    fn names(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            match entry.file_name().to_str() {
                Some(name) if validate_generation_name(name).is_ok() => names.push(name.to_string()),
                _ => debug!(dir = ?entry.file_name(), "Ignoring foreign directory in cache root"),
            }
        }
        names.sort();
        Ok(names)
    }

    fn open(&self, name: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(self.generation_dir(name)?)?;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let dir = self.generation_dir(name)?;
        if !dir.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir)?;
        debug!(generation = name, "Removed generation directory");
        Ok(true)
    }

    fn get(&self, name: &str, url: &str) -> Result<Option<CachedResponse>, StorageError> {
        let dir = self.generation_dir(name)?;
        if !dir.exists() {
            return Ok(None);
        }
        let index = self.load_index(&dir)?;
        match index.entries.get(url) {
            Some(meta) => Ok(Some(self.read_entry(&dir, url, meta)?)),
            None => Ok(None),
        }
    }

    fn put(&self, name: &str, entry: CachedResponse) -> Result<(), StorageError> {
        self.put_all(name, vec![entry])
    }

    fn put_all(&self, name: &str, entries: Vec<CachedResponse>) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let dir = self.generation_dir(name)?;
        std::fs::create_dir_all(&dir)?;
        let mut index = self.load_index(&dir)?;
        for entry in entries {
            self.write_entry(&dir, &mut index, entry)?;
        }
        self.save_index(&dir, &index)
    }

    fn entries(&self, name: &str) -> Result<Vec<CachedResponse>, StorageError> {
        let dir = self.generation_dir(name)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let index = self.load_index(&dir)?;
        index
            .entries
            .iter()
            .map(|(url, meta)| self.read_entry(&dir, url, meta))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Response;
    use tempfile::tempdir;

    fn entry(url: &str, body: &str) -> CachedResponse {
        CachedResponse::from_response(&Response::ok(url, body.as_bytes().to_vec()))
    }

    fn exercise(storage: &dyn CacheStorage) {
        storage.open("readykit-v1").unwrap();
        storage.put("readykit-v1", entry("/index.html", "<html>one")).unwrap();
        storage.put("readykit-v1", entry("/index.html", "<html>two")).unwrap();
        storage.put("readykit-v1", entry("/manifest.json", "{}")).unwrap();

        let got = storage.get("readykit-v1", "/index.html").unwrap().unwrap();
        assert_eq!(got.body, b"<html>two".to_vec());
        assert_eq!(storage.entries("readykit-v1").unwrap().len(), 2);
        assert!(storage.get("readykit-v1", "/missing").unwrap().is_none());
        assert!(storage.get("readykit-v0", "/index.html").unwrap().is_none());

        storage.open("readykit-v0").unwrap();
        assert_eq!(storage.names().unwrap(), vec!["readykit-v0", "readykit-v1"]);
        assert!(storage.delete("readykit-v0").unwrap());
        assert!(!storage.delete("readykit-v0").unwrap());
        assert_eq!(storage.names().unwrap(), vec!["readykit-v1"]);
    }

    #[test]
    fn test_generation_names() {
        assert!(validate_generation_name("readykit-v1.2").is_ok());
        assert!(validate_generation_name("readykit_v2").is_ok());
        for bad in ["", ".", "..", "a/b", "..\\x", "v 1"] {
            assert!(validate_generation_name(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_dotted_versions_round_trip() {
        let tmp = tempdir().expect("tempdir");
        let storage = FsCacheStorage::new(tmp.path().join("caches")).unwrap();
        storage.put("readykit-v1.2", entry("/", "shell")).unwrap();
        storage.open("readykit-v1.3").unwrap();
        std::fs::create_dir_all(tmp.path().join("caches").join("not valid")).unwrap();

        let names = storage.names().unwrap();
        assert_eq!(names, vec!["readykit-v1.2", "readykit-v1.3"]);
        for name in &names {
            assert!(storage.delete(name).unwrap());
        }
        assert!(storage.names().unwrap().is_empty());
    }

    #[test]
    fn test_memory_storage() {
        exercise(&MemoryCacheStorage::new());
    }

    #[test]
    fn test_fs_storage() {
        let tmp = tempdir().expect("tempdir");
        let storage = FsCacheStorage::new(tmp.path().join("caches")).unwrap();
        exercise(&storage);
    }

    #[test]
    fn test_fs_storage_survives_reopen() {
        let tmp = tempdir().expect("tempdir");
        let root = tmp.path().join("caches");
        {
            let storage = FsCacheStorage::new(root.clone()).unwrap();
            storage
                .put_all(
                    "readykit-v1",
                    vec![entry("/", "shell"), entry("/data/faq.json", "[]")],
                )
                .unwrap();
        }
        let storage = FsCacheStorage::new(root).unwrap();
        assert_eq!(storage.entries("readykit-v1").unwrap().len(), 2);
        assert_eq!(
            storage.get("readykit-v1", "/").unwrap().unwrap().body,
            b"shell".to_vec()
        );
    }
}
