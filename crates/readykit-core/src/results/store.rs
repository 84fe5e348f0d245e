use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use tracing::{debug, error, warn};

use super::record::{ResultKind, ResultRecord};
use crate::storage::{KeyValueStore, StorageError, RESULTS_KEY};

const ID_SUFFIX_LEN: usize = 6;

/// Stored collection: one JSON object keyed by record id. Values stay raw so
/// an entry this build cannot decode is carried through rewrites untouched.
type Collection = BTreeMap<String, Value>;

/// Append-only log of quiz and game outcomes.
///
/// The whole collection is read, extended and written back under one lock,
/// so appends from this process never lose each other. Separate processes
/// sharing the same store are last-write-wins.
pub struct ResultStore {
    kv: Arc<dyn KeyValueStore>,
    lock: Mutex<()>,
}

impl ResultStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            lock: Mutex::new(()),
        }
    }

    /// Store `record`, assigning an id and timestamp when missing.
    ///
    /// Persistence failures are logged and dropped; the returned record is
    /// what would have been stored.
    pub fn append(&self, record: ResultRecord) -> ResultRecord {
        let fallback = record.clone();
        match self.try_append(record) {
            Ok(stored) => stored,
            Err(e) => {
                error!(kind = %fallback.kind, subject = %fallback.subject_id, error = %e, "Failed to save result");
                complete(fallback, &Collection::new())
            }
        }
    }

    /// Like `append`, but reports persistence failures.
    pub fn try_append(&self, record: ResultRecord) -> Result<ResultRecord, StorageError> {
        check_finite(&record)?;
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut collection = self.read()?;
        let record = complete(record, &collection);
        let id = record.id.clone().unwrap_or_default();
        collection.insert(id.clone(), serde_json::to_value(&record)?);
        self.write(&collection)?;

        debug!(id = %id, "Result saved");
        Ok(record)
    }

    /// Every stored record, in no particular order. Entries that do not
    /// decode are skipped with a warning.
    pub fn list_all(&self) -> Result<Vec<ResultRecord>, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let records = self
            .read()?
            .into_iter()
            .filter_map(|(id, value)| match serde_json::from_value(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(id = %id, error = %e, "Skipping unreadable result");
                    None
                }
            })
            .collect();
        Ok(records)
    }

    pub fn filter<F>(&self, predicate: F) -> Result<Vec<ResultRecord>, StorageError>
    where
        F: Fn(&ResultRecord) -> bool,
    {
        Ok(self.list_all()?.into_iter().filter(|r| predicate(r)).collect())
    }

    pub fn for_user(&self, email: &str) -> Result<Vec<ResultRecord>, StorageError> {
        self.filter(|r| r.user() == Some(email))
    }

    fn read(&self) -> Result<Collection, StorageError> {
        match self.kv.load(RESULTS_KEY)? {
            Some(contents) => Ok(serde_json::from_str(&contents)?),
            None => Ok(Collection::new()),
        }
    }

    fn write(&self, collection: &Collection) -> Result<(), StorageError> {
        let contents = serde_json::to_string_pretty(collection)?;
        self.kv.save(RESULTS_KEY, &contents)
    }
}

/// JSON has no NaN or infinity; serde_json would write them as `null`.
fn check_finite(record: &ResultRecord) -> Result<(), StorageError> {
    let total_ok = record.total.map_or(true, f64::is_finite);
    if record.score.is_finite() && total_ok {
        Ok(())
    } else {
        Err(StorageError::InvalidValue(format!(
            "{} {} has a non-finite score",
            record.kind, record.subject_id
        )))
    }
}

/// Fill in timestamp and id. An id already taken in `existing` is replaced.
fn complete(mut record: ResultRecord, existing: &Collection) -> ResultRecord {
    if record.timestamp.is_none() {
        record.timestamp = Some(Utc::now());
    }
    let taken = match &record.id {
        Some(id) => id.is_empty() || existing.contains_key(id),
        None => true,
    };
    if taken {
        if let Some(old) = &record.id {
            debug!(id = %old, "Result id already used, assigning a new one");
        }
        let mut id = generate_id(record.kind);
        while existing.contains_key(&id) {
            id = generate_id(record.kind);
        }
        record.id = Some(id);
    }
    record
}

/// `<kind>-<epoch millis>-<random suffix>`
pub fn generate_id(kind: ResultKind) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}-{}-{}", kind, Utc::now().timestamp_millis(), suffix)
}
