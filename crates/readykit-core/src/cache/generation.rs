use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::age_display;
use crate::transport::{Response, ResponseType};

/// A response snapshot stored in a cache generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub url: String,
    pub status: u16,
    pub response_type: ResponseType,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub cached_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn from_response(response: &Response) -> Self {
        Self {
            url: response.url.clone(),
            status: response.status,
            response_type: response.response_type,
            content_type: response.content_type.clone(),
            body: response.body.clone(),
            cached_at: Utc::now(),
        }
    }

    pub fn into_response(self) -> Response {
        Response {
            url: self.url,
            status: self.status,
            response_type: self.response_type,
            content_type: self.content_type,
            body: self.body,
        }
    }

    pub fn age_display(&self) -> String {
        age_display(self.cached_at)
    }
}

/// Snapshot of the cache for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationSummary {
    pub version: String,
    pub state: String,
    pub generations: Vec<String>,
    pub entry_count: usize,
    pub newest_entry_age: Option<String>,
}

impl GenerationSummary {
    pub fn last_updated(&self) -> String {
        self.newest_entry_age
            .clone()
            .unwrap_or_else(|| "never".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_response_round_trip_keeps_fields() {
        let response = Response::ok("/data/faq.json", b"[]".to_vec())
            .with_content_type("application/json");
        let cached = CachedResponse::from_response(&response);
        assert_eq!(cached.age_display(), "just now");
        assert_eq!(cached.into_response(), response);
    }

    #[test]
    fn test_summary_last_updated_never() {
        let summary = GenerationSummary {
            version: "readykit-v1".into(),
            state: "idle".into(),
            generations: vec![],
            entry_count: 0,
            newest_entry_age: None,
        };
        assert_eq!(summary.last_updated(), "never");
    }
}
