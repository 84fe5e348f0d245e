use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use super::corpus::{CorpusLoader, SeedTier};
use super::external::{ExternalSearch, WikiSearch};
use super::fuzzy::MatchOptions;
use super::index::{normalize, tokenize, SearchHit, SearchIndex};
use crate::config::SearchConfig;
use crate::storage::KeyValueStore;
use crate::transport::Transport;

/// Which stage of the fallback chain produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerSource {
    Phrase,
    Token,
    External,
    Fallback,
}

impl fmt::Display for AnswerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AnswerSource::Phrase => "phrase match",
            AnswerSource::Token => "keyword match",
            AnswerSource::External => "online encyclopedia",
            AnswerSource::Fallback => "no confident answer",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub source: AnswerSource,
    /// Corpus id for phrase and token answers.
    pub matched_id: Option<String>,
    pub score: Option<f64>,
}

impl Answer {
    fn from_hit(hit: SearchHit<'_>, source: AnswerSource) -> Self {
        Self {
            text: hit.entry.answer.clone(),
            source,
            matched_id: Some(hit.entry.id.clone()),
            score: Some(hit.score),
        }
    }
}

/// How many times each stage was entered.
#[derive(Debug, Default)]
pub struct StageCounters {
    phrase: AtomicU64,
    token: AtomicU64,
    external: AtomicU64,
    fallback: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub phrase: u64,
    pub token: u64,
    pub external: u64,
    pub fallback: u64,
}

impl StageCounters {
    fn bump(&self, source: AnswerSource) {
        let counter = match source {
            AnswerSource::Phrase => &self.phrase,
            AnswerSource::Token => &self.token,
            AnswerSource::External => &self.external,
            AnswerSource::Fallback => &self.fallback,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StageCounts {
        StageCounts {
            phrase: self.phrase.load(Ordering::Relaxed),
            token: self.token.load(Ordering::Relaxed),
            external: self.external.load(Ordering::Relaxed),
            fallback: self.fallback.load(Ordering::Relaxed),
        }
    }
}

/// Answers free-text questions through a priority-ordered fallback chain:
/// whole-phrase fuzzy match, per-keyword fuzzy match, online lookup, then a
/// fixed message.
pub struct FallbackSearch {
    index: SearchIndex,
    external: Option<Arc<dyn ExternalSearch>>,
    config: SearchConfig,
    tier: Option<SeedTier>,
    counters: StageCounters,
}

impl FallbackSearch {
    pub fn new(index: SearchIndex, external: Option<Arc<dyn ExternalSearch>>, config: SearchConfig) -> Self {
        Self {
            index,
            external,
            config,
            tier: None,
            counters: StageCounters::default(),
        }
    }

    /// Resolve the corpus, build the index and wire the external stage.
    pub async fn initialize(
        config: SearchConfig,
        transport: Arc<dyn Transport>,
        kv: Arc<dyn KeyValueStore>,
    ) -> Self {
        let loader = CorpusLoader::new(transport.clone(), kv, config.corpus_url.clone());
        let corpus = loader.resolve().await;
        let index = SearchIndex::build(corpus.records(), match_options(&config));
        info!(entries = index.len(), tier = corpus.tier().label(), "Search index built");

        let external: Option<Arc<dyn ExternalSearch>> = if config.external.enabled {
            Some(Arc::new(WikiSearch::new(transport, config.external.clone())))
        } else {
            None
        };

        let mut search = Self::new(index, external, config);
        search.tier = Some(corpus.tier());
        search
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    /// Seed tier of the corpus, when built through `initialize`.
    pub fn tier(&self) -> Option<SeedTier> {
        self.tier
    }

    pub fn counts(&self) -> StageCounts {
        self.counters.snapshot()
    }

    pub async fn answer(&self, query: &str, online: bool) -> Answer {
        let normalized = normalize(query);
        if normalized.is_empty() {
            return self.fallback();
        }

        self.counters.bump(AnswerSource::Phrase);
        if let Some(hit) = self.index.best(&normalized) {
            if hit.score <= self.config.phrase_threshold {
                debug!(id = %hit.entry.id, score = hit.score, "Phrase stage matched");
                return Answer::from_hit(hit, AnswerSource::Phrase);
            }
        }

        self.counters.bump(AnswerSource::Token);
        for token in tokenize(&normalized, self.config.min_token_len) {
            if let Some(hit) = self.index.best(&token) {
                if hit.score <= self.config.token_threshold {
                    debug!(token = %token, id = %hit.entry.id, score = hit.score, "Token stage matched");
                    return Answer::from_hit(hit, AnswerSource::Token);
                }
            }
        }

        if online {
            if let Some(external) = &self.external {
                self.counters.bump(AnswerSource::External);
                if let Some(text) = external.lookup(&normalized).await {
                    return Answer {
                        text,
                        source: AnswerSource::External,
                        matched_id: None,
                        score: None,
                    };
                }
            }
        }

        self.fallback()
    }

    fn fallback(&self) -> Answer {
        self.counters.bump(AnswerSource::Fallback);
        Answer {
            text: self.config.fallback_message.clone(),
            source: AnswerSource::Fallback,
            matched_id: None,
            score: None,
        }
    }
}

fn match_options(config: &SearchConfig) -> MatchOptions {
    MatchOptions {
        threshold: config.match_threshold,
        min_match_char_len: config.min_match_char_len,
    }
}
