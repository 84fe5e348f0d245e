//! readykit core - offline-first data layer for a disaster-preparedness app.
//!
//! Three components share a transport port and a persistent key-value area:
//!
//! - [`cache::CacheManager`]: versioned asset cache with install / activate /
//!   fetch lifecycle and background resync of emergency contacts
//! - [`search::FallbackSearch`]: fuzzy Q&A over a small FAQ corpus with a
//!   phrase, keyword, online and fixed-message fallback chain
//! - [`results::ResultStore`]: append-only log of quiz and game outcomes

pub mod cache;
pub mod config;
pub mod results;
pub mod search;
pub mod session;
pub mod storage;
pub mod transport;

pub use cache::{CacheError, CacheManager, LifecycleEvent, LifecycleState};
pub use config::Config;
pub use results::{ResultKind, ResultRecord, ResultStore};
pub use search::{Answer, AnswerSource, FallbackSearch};
pub use session::{Role, Session};
pub use storage::{JsonFileStore, KeyValueStore, StorageError};
pub use transport::{FetchError, HttpTransport, Request, Response, Transport};
