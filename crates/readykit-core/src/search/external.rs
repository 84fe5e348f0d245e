//! Online encyclopedia lookup used as the last search stage before the
//! generic fallback message.
//!
//! Two chained calls: a keyword search returning ranked page titles, then a
//! summary fetch for the top title. Both are best effort; any error or
//! non-success status is reported as "nothing found".

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::config::ExternalSearchConfig;
use crate::transport::{FetchError, Request, Response, Transport};

#[async_trait]
pub trait ExternalSearch: Send + Sync {
    /// Best-effort lookup. `None` means no usable answer.
    async fn lookup(&self, query: &str) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    extract: Option<String>,
}

pub struct WikiSearch {
    transport: Arc<dyn Transport>,
    config: ExternalSearchConfig,
}

impl WikiSearch {
    pub fn new(transport: Arc<dyn Transport>, config: ExternalSearchConfig) -> Self {
        Self { transport, config }
    }

    pub fn search_url(&self, query: &str) -> Result<String, FetchError> {
        let mut url = parse_url(&self.config.search_url)?;
        url.query_pairs_mut()
            .append_pair("action", "query")
            .append_pair("list", "search")
            .append_pair("srsearch", query)
            .append_pair("utf8", "")
            .append_pair("format", "json")
            .append_pair("origin", "*");
        Ok(url.to_string())
    }

    pub fn summary_url(&self, title: &str) -> Result<String, FetchError> {
        let mut url = parse_url(&self.config.summary_url)?;
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidResponse(format!("Cannot append to {}", self.config.summary_url)))?
            .pop_if_empty()
            .push(title);
        Ok(url.to_string())
    }

    async fn top_title(&self, query: &str) -> Result<Option<String>, FetchError> {
        let response = self
            .transport
            .fetch(&Request::new(self.search_url(query)?))
            .await
            .and_then(Response::error_for_status)?;
        let parsed: SearchResponse = response.json()?;
        Ok(parsed
            .query
            .and_then(|q| q.search.into_iter().next())
            .and_then(|r| r.title)
            .filter(|t| !t.is_empty()))
    }

    async fn summary(&self, title: &str) -> Result<Option<String>, FetchError> {
        let response = self
            .transport
            .fetch(&Request::new(self.summary_url(title)?))
            .await
            .and_then(Response::error_for_status)?;
        let parsed: SummaryResponse = response.json()?;
        Ok(parsed
            .extract
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()))
    }

    async fn try_lookup(&self, query: &str) -> Result<Option<String>, FetchError> {
        match self.top_title(query).await? {
            Some(title) => {
                debug!(title = %title, "External search matched a page");
                self.summary(&title).await
            }
            None => Ok(None),
        }
    }
}

fn parse_url(raw: &str) -> Result<Url, FetchError> {
    Url::parse(raw).map_err(|e| FetchError::InvalidResponse(format!("Invalid URL {}: {}", raw, e)))
}

#[async_trait]
impl ExternalSearch for WikiSearch {
    async fn lookup(&self, query: &str) -> Option<String> {
        match self.try_lookup(query).await {
            Ok(summary) => summary,
            Err(e) => {
                debug!(error = %e, "External search unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FakeTransport;
    use serde_json::json;

    fn wiki(transport: &Arc<FakeTransport>) -> WikiSearch {
        WikiSearch::new(transport.clone(), ExternalSearchConfig::default())
    }

    #[test]
    fn test_urls_are_encoded() {
        let transport = Arc::new(FakeTransport::new());
        let search = wiki(&transport);
        let url = search.search_url("tsunami warning").unwrap();
        assert!(url.starts_with("https://en.wikipedia.org/w/api.php?action=query&list=search"));
        assert!(url.contains("srsearch=tsunami+warning"));
        assert_eq!(
            search.summary_url("Tsunami warning system").unwrap(),
            "https://en.wikipedia.org/api/rest_v1/page/summary/Tsunami%20warning%20system"
        );
    }

    #[tokio::test]
    async fn test_chained_lookup() {
        let transport = Arc::new(FakeTransport::new());
        let search = wiki(&transport);
        transport.respond_json(
            &search.search_url("volcano").unwrap(),
            &json!({"query": {"search": [{"title": "Volcano"}, {"title": "Lava"}]}}),
        );
        transport.respond_json(
            &search.summary_url("Volcano").unwrap(),
            &json!({"extract": "A volcano is a rupture in the crust."}),
        );

        assert_eq!(
            search.lookup("volcano").await.as_deref(),
            Some("A volcano is a rupture in the crust.")
        );
    }

    #[tokio::test]
    async fn test_no_title_or_empty_extract_is_none() {
        let transport = Arc::new(FakeTransport::new());
        let search = wiki(&transport);
        transport.respond_json(&search.search_url("qqq").unwrap(), &json!({"query": {"search": []}}));
        assert!(search.lookup("qqq").await.is_none());

        transport.respond_json(
            &search.search_url("blank").unwrap(),
            &json!({"query": {"search": [{"title": "Blank"}]}}),
        );
        transport.respond_json(&search.summary_url("Blank").unwrap(), &json!({"extract": "  "}));
        assert!(search.lookup("blank").await.is_none());
    }

    #[tokio::test]
    async fn test_failures_are_none() {
        let transport = Arc::new(FakeTransport::new());
        let search = wiki(&transport);
        // unknown URL answers 404
        assert!(search.lookup("flood").await.is_none());
        transport.set_online(false);
        assert!(search.lookup("flood").await.is_none());
    }
}
