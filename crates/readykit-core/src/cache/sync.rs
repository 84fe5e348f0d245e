//! Background resync of the critical resource.
//!
//! The emergency contacts are copied into the key-value area so they stay
//! available even if the asset cache is evicted. A failed resync is logged
//! and simply tried again on the next trigger.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::CacheError;
use crate::storage::{load_json, save_json, CachedData, KeyValueStore, EMERGENCY_CONTACTS_KEY};
use crate::transport::{Request, Response, Transport};

/// Sync tag that triggers the resync.
pub const BACKGROUND_SYNC_TAG: &str = "background-sync";

pub struct BackgroundSync {
    transport: Arc<dyn Transport>,
    kv: Arc<dyn KeyValueStore>,
    resource_url: String,
    failures: AtomicU64,
}

impl BackgroundSync {
    pub fn new(transport: Arc<dyn Transport>, kv: Arc<dyn KeyValueStore>, resource_url: String) -> Self {
        Self {
            transport,
            kv,
            resource_url,
            failures: AtomicU64::new(0),
        }
    }

    /// Number of failed resync attempts so far.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Fetch the resource and overwrite the stored copy.
    pub async fn run_once(&self) -> Result<(), CacheError> {
        let response = self
            .transport
            .fetch(&Request::new(self.resource_url.clone()))
            .await
            .and_then(Response::error_for_status)?;
        let value: serde_json::Value = response.json()?;
        save_json(self.kv.as_ref(), EMERGENCY_CONTACTS_KEY, &value)?;
        debug!(url = %self.resource_url, "Critical resource synced");
        Ok(())
    }

    /// Handle a sync trigger. Unknown tags are ignored. Never fails: errors
    /// are logged and left for the next trigger.
    pub async fn handle_trigger(&self, tag: &str) -> bool {
        if tag != BACKGROUND_SYNC_TAG {
            debug!(tag = tag, "Ignoring unknown sync tag");
            return false;
        }
        match self.run_once().await {
            Ok(()) => true,
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(url = %self.resource_url, error = %e, "Background sync failed, will retry on next trigger");
                false
            }
        }
    }

    /// Last stored copy of the resource. Read errors are logged and reported
    /// as absent.
    pub fn load(&self) -> Option<CachedData<serde_json::Value>> {
        match load_json(self.kv.as_ref(), EMERGENCY_CONTACTS_KEY) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Failed to read synced contacts");
                None
            }
        }
    }

    /// Trigger a resync every `interval` until `shutdown` flips to true.
    /// The first run happens immediately.
    pub fn spawn_periodic(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Background sync loop started");
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.handle_trigger(BACKGROUND_SYNC_TAG).await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Background sync loop stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::transport::FakeTransport;

    const CONTACTS: &str = "/data/contacts.json";

    fn setup() -> (Arc<FakeTransport>, Arc<MemoryStore>, Arc<BackgroundSync>) {
        let transport = Arc::new(FakeTransport::new());
        let kv = Arc::new(MemoryStore::new());
        let sync = Arc::new(BackgroundSync::new(
            transport.clone(),
            kv.clone(),
            CONTACTS.to_string(),
        ));
        (transport, kv, sync)
    }

    #[tokio::test]
    async fn test_trigger_overwrites_stored_copy() {
        let (transport, _, sync) = setup();
        transport.respond_json(CONTACTS, &serde_json::json!({"police": "100"}));
        assert!(sync.handle_trigger(BACKGROUND_SYNC_TAG).await);

        transport.respond_json(CONTACTS, &serde_json::json!({"police": "112"}));
        assert!(sync.handle_trigger(BACKGROUND_SYNC_TAG).await);

        let stored = sync.load().expect("contacts stored");
        assert_eq!(stored.data["police"], "112");
    }

    #[tokio::test]
    async fn test_failures_are_not_fatal_and_keep_old_copy() {
        let (transport, _, sync) = setup();
        transport.respond_json(CONTACTS, &serde_json::json!({"fire": "101"}));
        assert!(sync.handle_trigger(BACKGROUND_SYNC_TAG).await);

        transport.set_online(false);
        assert!(!sync.handle_trigger(BACKGROUND_SYNC_TAG).await);
        assert_eq!(sync.failures(), 1);
        assert_eq!(sync.load().unwrap().data["fire"], "101");

        // retried on the next trigger
        transport.set_online(true);
        assert!(sync.handle_trigger(BACKGROUND_SYNC_TAG).await);
    }

    #[tokio::test]
    async fn test_storage_failure_is_logged_not_fatal() {
        let (transport, kv, sync) = setup();
        transport.respond_json(CONTACTS, &serde_json::json!({}));
        kv.set_fail_writes(true);
        assert!(!sync.handle_trigger(BACKGROUND_SYNC_TAG).await);
        assert!(sync.load().is_none());
    }

    #[tokio::test]
    async fn test_unknown_tag_ignored() {
        let (transport, _, sync) = setup();
        assert!(!sync.handle_trigger("periodic-refresh").await);
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_loop_runs_until_shutdown() {
        let (transport, _, sync) = setup();
        transport.respond_json(CONTACTS, &serde_json::json!({"ambulance": "108"}));
        let (tx, rx) = watch::channel(false);

        let handle = Arc::clone(&sync).spawn_periodic(Duration::from_secs(60), rx);
        tokio::time::sleep(Duration::from_secs(150)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(transport.calls(CONTACTS) >= 2);
        assert!(sync.load().is_some());
    }
}
