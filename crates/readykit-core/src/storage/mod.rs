//! Persistent key-value area.
//!
//! Small JSON documents (the FAQ seed corpus, synced emergency contacts, the
//! result collection) live here, separate from the asset cache so they survive
//! cache eviction. Values are wrapped in `CachedData` to record when they were
//! written.
//!
//! Backends:
//! - `JsonFileStore`: one `<key>.json` file per key in a directory
//! - `MemoryStore`: process-local map, used by tests

pub mod file;
pub mod memory;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// Key of the FAQ seed corpus.
pub const FAQS_KEY: &str = "faqs";

/// Key of the quiz/game result collection.
pub const RESULTS_KEY: &str = "results";

/// Key of the synced emergency contacts.
pub const EMERGENCY_CONTACTS_KEY: &str = "emergency_contacts";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Refusing to store invalid value: {0}")]
    InvalidValue(String),
}

/// Raw string storage. Implementations must make `save` replace the whole
/// value in one step.
pub trait KeyValueStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn save(&self, key: &str, contents: &str) -> Result<(), StorageError>;
}

/// Keys become file names, so keep them to a safe alphabet.
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        age_display(self.cached_at)
    }

    pub fn is_stale(&self, max_age_minutes: i64) -> bool {
        self.age_minutes() > max_age_minutes
    }
}

/// Human-readable age of a timestamp ("just now", "5m ago", "2h ago", "3d ago").
pub fn age_display(at: DateTime<Utc>) -> String {
    let minutes = (Utc::now() - at).num_minutes();
    if minutes < 1 {
        // Also covers clock skew
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        if minutes % 60 >= 30 {
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        if (minutes % 1440) / 60 >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}

/// Load a typed value written by `save_json`.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<CachedData<T>>, StorageError> {
    match store.load(key)? {
        Some(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        None => Ok(None),
    }
}

/// Serialize `data` with a fresh `cached_at` and replace the value at `key`.
pub fn save_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    data: &T,
) -> Result<(), StorageError> {
    let contents = serde_json::to_string_pretty(&CachedData::new(data))?;
    store.save(key, &contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_cached_data_age_display_just_now() {
        let cached = CachedData::new(vec![1, 2, 3]);
        assert_eq!(cached.age_display(), "just now");
    }

    #[test]
    fn test_cached_data_is_stale() {
        let fresh = CachedData::new(vec![1]);
        assert!(!fresh.is_stale(60));

        let mut old = CachedData::new(vec![1]);
        old.cached_at = Utc::now() - Duration::minutes(61);
        assert!(old.is_stale(60));
    }

    #[test]
    fn test_age_display_rounding() {
        assert_eq!(age_display(Utc::now() - Duration::minutes(5)), "5m ago");
        assert_eq!(age_display(Utc::now() - Duration::minutes(95)), "2h ago");
        assert_eq!(age_display(Utc::now() - Duration::minutes(70)), "1h ago");
        assert_eq!(age_display(Utc::now() - Duration::hours(60)), "3d ago");
        assert_eq!(age_display(Utc::now() + Duration::minutes(5)), "just now");
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("emergency_contacts").is_ok());
        assert!(validate_key("readykit-v1").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../etc/passwd").is_err());
    }

    #[test]
    fn test_json_helpers_round_trip() {
        let store = MemoryStore::new();
        save_json(&store, "numbers", &vec![1, 2, 3]).unwrap();
        let loaded: CachedData<Vec<i32>> = load_json(&store, "numbers").unwrap().unwrap();
        assert_eq!(loaded.data, vec![1, 2, 3]);
        assert!(load_json::<Vec<i32>>(&store, "missing").unwrap().is_none());
    }
}
