//! HTTP transport backed by reqwest.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Url};
use tracing::{debug, warn};

use super::{FetchError, Request, Response, ResponseType, Transport};

/// Default HTTP request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Transport for real network access.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    origin: Url,
    backoff_ms: u64,
    /// Outcome of the last request: cleared by a network-level failure, set
    /// again by any answer from a server. Shared between clones.
    reachable: Arc<AtomicBool>,
}

impl HttpTransport {
    /// Create a transport that resolves relative URLs against `origin`.
    pub fn new(origin: &str) -> Result<Self, FetchError> {
        Self::with_timeout(origin, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(origin: &str, timeout: Duration) -> Result<Self, FetchError> {
        let origin = Url::parse(origin)
            .map_err(|e| FetchError::InvalidResponse(format!("Invalid origin {}: {}", origin, e)))?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            origin,
            backoff_ms: INITIAL_BACKOFF_MS,
            reachable: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    fn resolve(&self, url: &str) -> Result<Url, FetchError> {
        self.origin
            .join(url)
            .map_err(|e| FetchError::InvalidResponse(format!("Invalid URL {}: {}", url, e)))
    }

    fn is_same_origin(&self, url: &Url) -> bool {
        url.scheme() == self.origin.scheme()
            && url.host_str() == self.origin.host_str()
            && url.port_or_known_default() == self.origin.port_or_known_default()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let url = self.resolve(&request.url)?;
        let mut retries = 0;
        let mut backoff_ms = self.backoff_ms;

        loop {
            let response = match self.client.get(url.clone()).send().await {
                Ok(response) => response,
                Err(e) => {
                    let err = FetchError::from(e);
                    if err.is_network_failure() {
                        debug!(url = %url, error = %err, "Network unreachable");
                        self.reachable.store(false, Ordering::Relaxed);
                    }
                    return Err(err);
                }
            };
            self.reachable.store(true, Ordering::Relaxed);
            let status = response.status();

            if status.as_u16() == 429 {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(FetchError::RateLimited);
                }
                warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
                continue;
            }

            let final_url = response.url().clone();
            let response_type = if self.is_same_origin(&final_url) {
                ResponseType::Basic
            } else {
                ResponseType::Cors
            };
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.bytes().await?.to_vec();

            debug!(url = %url, status = status.as_u16(), bytes = body.len(), "Fetched");

            return Ok(Response {
                // Keep the caller's key so cache lookups match the request
                url: request.url.clone(),
                status: status.as_u16(),
                response_type,
                content_type,
                body,
            });
        }
    }

    /// Hint only: true until a request fails to reach any server.
    fn is_online(&self) -> bool {
        self.reachable.load(Ordering::Relaxed)
    }
}
