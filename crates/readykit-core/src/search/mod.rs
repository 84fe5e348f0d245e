//! Offline question answering.
//!
//! - `corpus`: three-tier corpus resolution (store, network, built-in)
//! - `fuzzy`: approximate substring scoring
//! - `index`: immutable index over the resolved corpus
//! - `external`: online encyclopedia lookup
//! - `assistant`: the four-stage fallback chain
//! - `voice`: listening controller and speaker port

pub mod assistant;
pub mod corpus;
pub mod external;
pub mod fuzzy;
pub mod index;
pub mod voice;

pub use assistant::{Answer, AnswerSource, FallbackSearch, StageCounts};
pub use corpus::{CorpusError, CorpusLoader, FaqRecord, SearchCorpus, SeedTier};
pub use external::{ExternalSearch, WikiSearch};
pub use fuzzy::MatchOptions;
pub use index::{IndexEntry, SearchHit, SearchIndex};
pub use voice::{ListeningController, Recognizer, Speaker};
