//! FAQ corpus resolution.
//!
//! The corpus is resolved once per session by trying three seed tiers in
//! order: the persistent key-value area, the network, then a built-in
//! minimal set. Any failure moves on to the next tier, so resolution always
//! yields a non-empty corpus.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::storage::{load_json, save_json, KeyValueStore, StorageError, FAQS_KEY};
use crate::transport::{FetchError, Request, Response, Transport};

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("Corpus storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Corpus fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Corpus tier is empty")]
    Empty,
}

/// One question/answer record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqRecord {
    pub id: String,
    pub questions: Vec<String>,
    pub answer: String,
}

/// Where the corpus came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedTier {
    Store,
    Network,
    BuiltIn,
}

impl SeedTier {
    pub fn label(&self) -> &'static str {
        match self {
            SeedTier::Store => "local store",
            SeedTier::Network => "network",
            SeedTier::BuiltIn => "built-in",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchCorpus {
    records: Vec<FaqRecord>,
    tier: SeedTier,
}

impl SearchCorpus {
    pub fn new(records: Vec<FaqRecord>, tier: SeedTier) -> Self {
        Self { records, tier }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_records(), SeedTier::BuiltIn)
    }

    pub fn records(&self) -> &[FaqRecord] {
        &self.records
    }

    pub fn tier(&self) -> SeedTier {
        self.tier
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Minimal set used when neither the store nor the network has a corpus.
pub fn builtin_records() -> Vec<FaqRecord> {
    vec![
        FaqRecord {
            id: "fallback_earthquake".to_string(),
            questions: vec![
                "earthquake safety".to_string(),
                "भूकंप के समय क्या करें".to_string(),
            ],
            answer: "Take cover under a sturdy table or desk, stay away from windows, \
                     and do not use the lift."
                .to_string(),
        },
        FaqRecord {
            id: "fallback_fire".to_string(),
            questions: vec![
                "fire safety".to_string(),
                "आग लगने पर क्या करें".to_string(),
            ],
            answer: "Stay low to avoid smoke, cover your nose and mouth, \
                     and leave by the stairs."
                .to_string(),
        },
    ]
}

/// Validate loosely-typed records.
///
/// A record needs a `questions` array (or a single `question` string) and a
/// string `answer`; anything else is dropped with a warning. Non-string
/// question variants are skipped, and a missing id becomes `faq-<position>`.
pub fn validate_records(values: &[Value]) -> Vec<FaqRecord> {
    let mut records = Vec::with_capacity(values.len());

    for (position, value) in values.iter().enumerate() {
        let Some(object) = value.as_object() else {
            warn!(position = position, "Dropping FAQ record: not an object");
            continue;
        };

        let Some(answer) = object.get("answer").and_then(Value::as_str) else {
            warn!(position = position, "Dropping FAQ record: missing answer");
            continue;
        };

        let questions: Vec<String> = match (object.get("questions"), object.get("question")) {
            (Some(Value::Array(items)), _) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            (None, Some(Value::String(single))) => vec![single.clone()],
            _ => {
                warn!(position = position, "Dropping FAQ record: missing questions");
                continue;
            }
        };

        let id = match object.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => format!("faq-{}", position),
        };

        records.push(FaqRecord {
            id,
            questions,
            answer: answer.to_string(),
        });
    }

    records
}

/// Accept either a bare array or an object wrapping one under `faqs`.
fn record_values(document: Value) -> Vec<Value> {
    match document {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("faqs") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

pub struct CorpusLoader {
    transport: Arc<dyn Transport>,
    kv: Arc<dyn KeyValueStore>,
    corpus_url: String,
}

impl CorpusLoader {
    pub fn new(transport: Arc<dyn Transport>, kv: Arc<dyn KeyValueStore>, corpus_url: String) -> Self {
        Self {
            transport,
            kv,
            corpus_url,
        }
    }

    /// Resolve the corpus through the seed tiers. Never fails.
    pub async fn resolve(&self) -> SearchCorpus {
        match self.from_store() {
            Ok(records) => {
                info!(records = records.len(), "FAQ corpus seeded from local store");
                return SearchCorpus::new(records, SeedTier::Store);
            }
            Err(e) => debug!(error = %e, "Local FAQ store unusable, trying network"),
        }

        match self.from_network().await {
            Ok(records) => {
                info!(records = records.len(), "FAQ corpus seeded from network");
                // Persist for the next offline session; losing this write only costs a refetch
                if let Err(e) = save_json(self.kv.as_ref(), FAQS_KEY, &records) {
                    warn!(error = %e, "Failed to persist FAQ corpus");
                }
                return SearchCorpus::new(records, SeedTier::Network);
            }
            Err(e) => warn!(url = %self.corpus_url, error = %e, "FAQ corpus fetch failed, using built-in set"),
        }

        SearchCorpus::builtin()
    }

    fn from_store(&self) -> Result<Vec<FaqRecord>, CorpusError> {
        let stored = load_json::<Vec<Value>>(self.kv.as_ref(), FAQS_KEY)?.ok_or(CorpusError::Empty)?;
        non_empty(validate_records(&stored.data))
    }

    async fn from_network(&self) -> Result<Vec<FaqRecord>, CorpusError> {
        let response = self
            .transport
            .fetch(&Request::new(self.corpus_url.clone()))
            .await
            .and_then(Response::error_for_status)?;
        let document: Value = response.json()?;
        non_empty(validate_records(&record_values(document)))
    }
}

fn non_empty(records: Vec<FaqRecord>) -> Result<Vec<FaqRecord>, CorpusError> {
    if records.is_empty() {
        Err(CorpusError::Empty)
    } else {
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::transport::FakeTransport;
    use serde_json::json;

    const FAQ_URL: &str = "/data/faq.json";

    fn loader(transport: &Arc<FakeTransport>, kv: &Arc<MemoryStore>) -> CorpusLoader {
        CorpusLoader::new(transport.clone(), kv.clone(), FAQ_URL.to_string())
    }

    fn network_faqs() -> Value {
        json!([
            {"id": "flood_1", "questions": ["flood safety", "how to stay safe in a flood"], "answer": "Move to higher ground."},
            {"id": "cyclone_1", "questions": ["cyclone warning"], "answer": "Stay indoors away from windows."}
        ])
    }

    #[test]
    fn test_validate_drops_invalid_records() {
        let values = vec![
            json!({"id": "a", "questions": ["q1", 7, "q2"], "answer": "A"}),
            json!({"id": "b", "questions": "not a list", "answer": "B"}),
            json!({"id": "c", "questions": ["q"]}),
            json!({"question": "single form", "answer": "D", "category": "general"}),
            json!(42),
            json!({"id": 9, "questions": [], "answer": "E"}),
        ];
        let records = validate_records(&values);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].questions, vec!["q1", "q2"]);
        assert_eq!(records[1].id, "faq-3");
        assert_eq!(records[1].questions, vec!["single form"]);
        assert_eq!(records[2].id, "9");
    }

    #[test]
    fn test_builtin_is_non_empty() {
        let corpus = SearchCorpus::builtin();
        assert!(!corpus.is_empty());
        assert_eq!(corpus.tier(), SeedTier::BuiltIn);
    }

    #[tokio::test]
    async fn test_store_tier_wins() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond_json(FAQ_URL, &network_faqs());
        let kv = Arc::new(MemoryStore::new());
        save_json(kv.as_ref(), FAQS_KEY, &builtin_records()).unwrap();

        let corpus = loader(&transport, &kv).resolve().await;
        assert_eq!(corpus.tier(), SeedTier::Store);
        assert_eq!(corpus.records(), builtin_records().as_slice());
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_network_tier_persists_records() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond_json(FAQ_URL, &network_faqs());
        let kv = Arc::new(MemoryStore::new());

        let corpus = loader(&transport, &kv).resolve().await;
        assert_eq!(corpus.tier(), SeedTier::Network);
        assert_eq!(corpus.len(), 2);

        // Next session starts from the store
        let again = loader(&transport, &kv).resolve().await;
        assert_eq!(again.tier(), SeedTier::Store);
        assert_eq!(transport.calls(FAQ_URL), 1);
    }

    #[tokio::test]
    async fn test_network_accepts_wrapped_document() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond_json(FAQ_URL, &json!({"faqs": network_faqs()}));
        let kv = Arc::new(MemoryStore::new());

        let corpus = loader(&transport, &kv).resolve().await;
        assert_eq!(corpus.tier(), SeedTier::Network);
        assert_eq!(corpus.records()[0].id, "flood_1");
    }

    #[tokio::test]
    async fn test_falls_back_to_builtin_when_offline() {
        let transport = Arc::new(FakeTransport::new());
        transport.set_online(false);
        let kv = Arc::new(MemoryStore::new());

        let corpus = loader(&transport, &kv).resolve().await;
        assert_eq!(corpus.tier(), SeedTier::BuiltIn);
        assert_eq!(corpus.len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_store_and_bad_network_fall_through() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond_text(FAQ_URL, "<html>not json</html>");
        let kv = Arc::new(MemoryStore::new());
        kv.save(FAQS_KEY, "{ broken").unwrap();

        let corpus = loader(&transport, &kv).resolve().await;
        assert_eq!(corpus.tier(), SeedTier::BuiltIn);
    }

    #[tokio::test]
    async fn test_persist_failure_is_not_fatal() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond_json(FAQ_URL, &network_faqs());
        let kv = Arc::new(MemoryStore::new());
        kv.set_fail_writes(true);

        let corpus = loader(&transport, &kv).resolve().await;
        assert_eq!(corpus.tier(), SeedTier::Network);
    }
}
