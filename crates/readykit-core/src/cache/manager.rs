use std::fmt;
use std::sync::{Arc, Mutex};

use futures::future::try_join_all;
use tracing::{debug, error, info, warn};

use super::generation::{CachedResponse, GenerationSummary};
use super::storage::CacheStorage;
use super::sync::BackgroundSync;
use super::CacheError;
use crate::config::CacheConfig;
use crate::storage::{CachedData, KeyValueStore};
use crate::transport::{Request, Response, Transport};

/// Lifecycle of the cache for one version tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing installed for this version yet.
    Idle,
    Installing,
    /// Generation complete but not serving yet.
    Installed(String),
    Activating,
    /// Stale generations removed; serving from this generation.
    Active(String),
    /// Install failed; a new install is needed.
    Redundant,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Idle => write!(f, "idle"),
            LifecycleState::Installing => write!(f, "installing"),
            LifecycleState::Installed(name) => write!(f, "installed ({})", name),
            LifecycleState::Activating => write!(f, "activating"),
            LifecycleState::Active(name) => write!(f, "active ({})", name),
            LifecycleState::Redundant => write!(f, "redundant"),
        }
    }
}

/// Events the host delivers to the cache.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Install,
    Activate,
    Fetch(Request),
    Sync(String),
}

#[derive(Debug)]
pub enum EventOutcome {
    Installed { entries: usize },
    Activated { deleted: Vec<String> },
    Response(Response),
    /// Whether the sync tag was recognized and the resync succeeded.
    Synced(bool),
}

pub struct CacheManager {
    config: CacheConfig,
    transport: Arc<dyn Transport>,
    storage: Arc<dyn CacheStorage>,
    sync: Arc<BackgroundSync>,
    state: Mutex<LifecycleState>,
}

impl CacheManager {
    /// Create a manager for `config.version`. If a generation with that name
    /// already exists in `storage` (installed by an earlier run) the manager
    /// starts out `Installed` and only needs activating.
    pub fn new(
        config: CacheConfig,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn CacheStorage>,
        kv: Arc<dyn KeyValueStore>,
    ) -> Result<Self, CacheError> {
        let initial = if storage.names()?.contains(&config.version) {
            LifecycleState::Installed(config.version.clone())
        } else {
            LifecycleState::Idle
        };
        debug!(version = %config.version, state = %initial, "Cache manager created");

        let sync = Arc::new(BackgroundSync::new(
            Arc::clone(&transport),
            kv,
            config.critical_resource.clone(),
        ));

        Ok(Self {
            config,
            transport,
            storage,
            sync,
            state: Mutex::new(initial),
        })
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn state(&self) -> LifecycleState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_state(&self, next: LifecycleState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        debug!(from = %*state, to = %next, "Cache lifecycle transition");
        *state = next;
    }

    /// Move into `next` if the current state allows `action`; returns the
    /// state that was left.
    fn begin(
        &self,
        action: &'static str,
        allowed: impl Fn(&LifecycleState) -> bool,
        next: LifecycleState,
    ) -> Result<LifecycleState, CacheError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !allowed(&state) {
            return Err(CacheError::InvalidTransition {
                action,
                state: state.to_string(),
            });
        }
        Ok(std::mem::replace(&mut *state, next))
    }

    pub fn background_sync(&self) -> Arc<BackgroundSync> {
        Arc::clone(&self.sync)
    }

    // ===== Lifecycle =====

    /// Deliver a lifecycle event.
    pub async fn dispatch(&self, event: LifecycleEvent) -> Result<EventOutcome, CacheError> {
        match event {
            LifecycleEvent::Install => {
                let assets = self.config.assets.clone();
                let entries = self.install(&assets).await?;
                Ok(EventOutcome::Installed { entries })
            }
            LifecycleEvent::Activate => {
                let deleted = self.activate()?;
                Ok(EventOutcome::Activated { deleted })
            }
            LifecycleEvent::Fetch(request) => {
                Ok(EventOutcome::Response(self.handle_fetch(&request).await?))
            }
            LifecycleEvent::Sync(tag) => Ok(EventOutcome::Synced(self.sync.handle_trigger(&tag).await)),
        }
    }

    /// Fetch every asset and store them all under the current generation.
    ///
    /// All-or-nothing: if any asset cannot be fetched (network failure or a
    /// non-success status) nothing is written and the install is aborted.
    /// Returns the number of entries stored.
    pub async fn install(&self, assets: &[String]) -> Result<usize, CacheError> {
        let previous = self.begin(
            "install",
            |s| !matches!(s, LifecycleState::Installing | LifecycleState::Activating),
            LifecycleState::Installing,
        )?;
        info!(version = %self.config.version, assets = assets.len(), "Installing cache generation");

        let transport = &self.transport;
        let fetches = assets.iter().map(|url| async move {
            let request = Request::new(url.clone());
            let response = transport
                .fetch(&request)
                .await
                .and_then(Response::error_for_status)
                .map_err(|source| CacheError::InstallFailed {
                    url: url.clone(),
                    source,
                })?;
            Ok::<_, CacheError>(CachedResponse::from_response(&response))
        });

        let entries = match try_join_all(fetches).await {
            Ok(entries) => entries,
            Err(e) => {
                error!(version = %self.config.version, error = %e, "Install aborted");
                self.set_state(after_failed_install(previous));
                return Err(e);
            }
        };

        let count = entries.len();
        let stored = self
            .storage
            .open(&self.config.version)
            .and_then(|_| self.storage.put_all(&self.config.version, entries));
        if let Err(e) = stored {
            error!(version = %self.config.version, error = %e, "Failed to store installed assets");
            self.set_state(after_failed_install(previous));
            return Err(e.into());
        }

        self.set_state(LifecycleState::Installed(self.config.version.clone()));
        info!(version = %self.config.version, entries = count, "Cache generation installed");
        Ok(count)
    }

    /// Delete every generation other than the current one, then start serving.
    /// Returns the names of the deleted generations.
    pub fn activate(&self) -> Result<Vec<String>, CacheError> {
        let previous = self.begin(
            "activate",
            |s| matches!(s, LifecycleState::Installed(_) | LifecycleState::Active(_)),
            LifecycleState::Activating,
        )?;

        let mut deleted = Vec::new();
        let result = (|| -> Result<(), CacheError> {
            for name in self.storage.names()? {
                if name != self.config.version {
                    info!(generation = %name, "Deleting old cache generation");
                    if self.storage.delete(&name)? {
                        deleted.push(name);
                    }
                }
            }
            Ok(())
        })();

        if let Err(e) = result {
            warn!(error = %e, "Activation failed, staying inactive");
            self.set_state(previous);
            return Err(e);
        }

        self.set_state(LifecycleState::Active(self.config.version.clone()));
        Ok(deleted)
    }

    // ===== Serving =====

    /// Serve a request cache-first.
    ///
    /// On a miss the network is consulted and fresh same-origin responses are
    /// written through to the current generation. When the network fails, a
    /// document request gets the app shell; anything else gets the error.
    pub async fn handle_fetch(&self, request: &Request) -> Result<Response, CacheError> {
        let generation = match self.state() {
            LifecycleState::Active(name) => name,
            _ => return Err(CacheError::NotActive(self.config.version.clone())),
        };

        match self.storage.get(&generation, &request.url) {
            Ok(Some(cached)) => {
                debug!(url = %request.url, "Cache hit");
                return Ok(cached.into_response());
            }
            Ok(None) => {}
            Err(e) => warn!(url = %request.url, error = %e, "Cache lookup failed, trying network"),
        }

        match self.transport.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    if let Err(e) = self
                        .storage
                        .put(&generation, CachedResponse::from_response(&response))
                    {
                        warn!(url = %request.url, error = %e, "Failed to write response to cache");
                    }
                } else {
                    debug!(
                        url = %request.url,
                        status = response.status,
                        response_type = ?response.response_type,
                        "Response not cacheable"
                    );
                }
                Ok(response)
            }
            Err(e) if request.expects_document() && e.is_network_failure() => {
                debug!(url = %request.url, error = %e, "Network failed, serving app shell");
                match self.storage.get(&generation, &self.config.app_shell) {
                    Ok(Some(shell)) => Ok(shell.into_response()),
                    Ok(None) => Err(e.into()),
                    Err(storage_err) => {
                        warn!(error = %storage_err, "App shell lookup failed");
                        Err(e.into())
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    // ===== Inspection =====

    pub fn summary(&self) -> Result<GenerationSummary, CacheError> {
        let generations = self.storage.names()?;
        let entries = self.storage.entries(&self.config.version)?;
        let newest = entries.iter().map(|e| e.cached_at).max();

        Ok(GenerationSummary {
            version: self.config.version.clone(),
            state: self.state().to_string(),
            generations,
            entry_count: entries.len(),
            newest_entry_age: newest.map(crate::storage::age_display),
        })
    }

    /// Last synced copy of the critical resource, if any.
    pub fn emergency_contacts(&self) -> Option<CachedData<serde_json::Value>> {
        self.sync.load()
    }

    /// True when the contacts were never synced or have missed two
    /// scheduled resyncs.
    pub fn contacts_are_stale(&self) -> bool {
        let max_age_minutes = (2 * self.config.sync_interval_secs / 60) as i64;
        self.emergency_contacts()
            .map_or(true, |contacts| contacts.is_stale(max_age_minutes))
    }
}

/// A failed install leaves an existing generation serving; otherwise the
/// attempt is dead and a new install is needed.
fn after_failed_install(previous: LifecycleState) -> LifecycleState {
    match previous {
        LifecycleState::Active(_) | LifecycleState::Installed(_) => previous,
        _ => LifecycleState::Redundant,
    }
}
