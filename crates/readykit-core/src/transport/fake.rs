//! In-memory transport for tests and demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{FetchError, Request, Response, Transport};

enum Route {
    Respond(Response),
    Fail(String),
}

/// Scripted transport. Unknown URLs answer 404; `set_online(false)` makes
/// every fetch fail with `FetchError::Offline`.
pub struct FakeTransport {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<HashMap<String, u64>>,
    total_calls: AtomicU64,
    online: AtomicBool,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            total_calls: AtomicU64::new(0),
            online: AtomicBool::new(true),
        }
    }
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, response: Response) -> &Self {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), Route::Respond(response));
        self
    }

    pub fn respond_text(&self, url: &str, body: &str) -> &Self {
        self.respond(url, Response::ok(url, body.as_bytes().to_vec()))
    }

    pub fn respond_json(&self, url: &str, value: &serde_json::Value) -> &Self {
        self.respond(
            url,
            Response::ok(url, value.to_string().into_bytes()).with_content_type("application/json"),
        )
    }

    /// Make fetches of `url` fail at the connection level.
    pub fn fail(&self, url: &str) -> &Self {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), Route::Fail(format!("connection refused: {}", url)));
        self
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of fetches attempted for `url`, including failed ones.
    pub fn calls(&self, url: &str) -> u64 {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(request.url.clone())
            .or_insert(0) += 1;

        if !self.is_online() {
            return Err(FetchError::Offline);
        }

        let routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        match routes.get(&request.url) {
            Some(Route::Respond(response)) => Ok(response.clone()),
            Some(Route::Fail(reason)) => Err(FetchError::Connection(reason.clone())),
            None => Ok(Response::ok(request.url.clone(), Vec::new()).with_status(404)),
        }
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
