//! Offline asset cache.
//!
//! This module provides the `CacheManager`, which keeps a named, versioned
//! snapshot ("generation") of the assets the app needs offline, serves
//! requests cache-first with network fallback, and removes superseded
//! generations on activation.
//!
//! - `generation`: stored response snapshots
//! - `storage`: `CacheStorage` port with memory and filesystem backends
//! - `manager`: lifecycle state machine (install / activate / fetch)
//! - `sync`: background resync of the critical resource into the key-value area

pub mod generation;
pub mod manager;
pub mod storage;
pub mod sync;

use thiserror::Error;

use crate::storage::StorageError;
use crate::transport::FetchError;

pub use generation::{CachedResponse, GenerationSummary};
pub use manager::{CacheManager, LifecycleEvent, LifecycleState, EventOutcome};
pub use storage::{CacheStorage, FsCacheStorage, MemoryCacheStorage};
pub use sync::{BackgroundSync, BACKGROUND_SYNC_TAG};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Install aborted: could not cache {url}: {source}")]
    InstallFailed {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Cache generation {0} is not active")]
    NotActive(String),

    #[error("Cannot {action} while {state}")]
    InvalidTransition { action: &'static str, state: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
