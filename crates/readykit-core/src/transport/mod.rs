//! Network transport port.
//!
//! Every component that talks to the network does so through the
//! `Transport` trait so that the real HTTP client (`HttpTransport`) can be
//! swapped for `FakeTransport` in tests. Requests and responses are plain
//! owned values: a `Response` can be cloned into the cache and handed back to
//! the caller without sharing a body stream.

pub mod error;
pub mod fake;
pub mod http;

use std::borrow::Cow;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub use error::FetchError;
pub use fake::FakeTransport;
pub use http::HttpTransport;

/// What kind of resource a request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Script,
    Style,
    Json,
    Image,
    #[default]
    Other,
}

impl Destination {
    /// Guess the destination from the URL path.
    pub fn infer(url: &str) -> Self {
        let path = url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let last = path.rsplit('/').next().unwrap_or_default();

        if last.is_empty() || last.ends_with(".html") || last.ends_with(".htm") {
            Destination::Document
        } else if last.ends_with(".js") || last.ends_with(".mjs") {
            Destination::Script
        } else if last.ends_with(".css") {
            Destination::Style
        } else if last.ends_with(".json") {
            Destination::Json
        } else if [".png", ".jpg", ".jpeg", ".svg", ".gif", ".webp", ".ico"]
            .iter()
            .any(|ext| last.ends_with(ext))
        {
            Destination::Image
        } else {
            Destination::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub destination: Destination,
}

impl Request {
    /// Build a request, inferring the destination from the URL.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let destination = Destination::infer(&url);
        Self { url, destination }
    }

    /// A top-level navigation request.
    pub fn document(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            destination: Destination::Document,
        }
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn expects_document(&self) -> bool {
        self.destination == Destination::Document
    }
}

/// Response tainting, following the fetch model. Only `Basic` responses
/// (same-origin, readable) are ever written to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Basic,
    Cors,
    Opaque,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub url: String,
    pub status: u16,
    pub response_type: ResponseType,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Response {
    /// A same-origin 200 response.
    pub fn ok(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            response_type: ResponseType::Basic,
            content_type: None,
            body: body.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Only fresh same-origin responses are safe to keep offline.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.response_type == ResponseType::Basic
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, FetchError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            FetchError::InvalidResponse(format!("Failed to parse JSON from {}: {}", self.url, e))
        })
    }

    /// Turn a non-success status into an error.
    pub fn error_for_status(self) -> Result<Self, FetchError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(FetchError::from_status(&self.url, self.status, &self.text()))
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;

    /// Whether the transport believes the network is reachable.
    fn is_online(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_infer() {
        assert_eq!(Destination::infer("/"), Destination::Document);
        assert_eq!(Destination::infer("/index.html"), Destination::Document);
        assert_eq!(Destination::infer("/static/js/bundle.js"), Destination::Script);
        assert_eq!(Destination::infer("/static/css/main.css"), Destination::Style);
        assert_eq!(Destination::infer("/data/faq.json?v=2"), Destination::Json);
        assert_eq!(Destination::infer("/icon-192x192.png"), Destination::Image);
        assert_eq!(Destination::infer("/manifest.webmanifest"), Destination::Other);
    }

    #[test]
    fn test_response_cacheable_only_when_fresh_and_basic() {
        assert!(Response::ok("/a.json", "{}").is_cacheable());
        assert!(!Response::ok("/a.json", "").with_status(404).is_cacheable());
        assert!(!Response::ok("/a.json", "").with_status(204).is_cacheable());
        assert!(!Response::ok("https://cdn.example/a.js", "")
            .with_type(ResponseType::Opaque)
            .is_cacheable());
    }

    #[test]
    fn test_error_for_status() {
        assert!(Response::ok("/", "x").error_for_status().is_ok());
        let err = Response::ok("/gone", "nope")
            .with_status(404)
            .error_for_status()
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }
}
