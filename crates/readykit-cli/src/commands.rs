use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use readykit_core::cache::{CacheStorage, EventOutcome, FsCacheStorage, BACKGROUND_SYNC_TAG};
use readykit_core::results::newest_first;
use readykit_core::{
    CacheManager, Config, FallbackSearch, HttpTransport, JsonFileStore, KeyValueStore,
    LifecycleEvent, LifecycleState, Request, ResultKind, ResultRecord, ResultStore, Role, Session,
    Transport,
};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::cli::{Command, ResultsCommand};

/// Components wired against the real network and the data directory.
pub struct App {
    config: Config,
    transport: Arc<dyn Transport>,
    kv: Arc<dyn KeyValueStore>,
    cache: CacheManager,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(
            HttpTransport::with_timeout(
                &config.origin,
                Duration::from_secs(config.request_timeout_secs),
            )
            .with_context(|| format!("Invalid origin: {}", config.origin))?,
        );

        let cache_dir = config.cache_dir()?;
        let storage: Arc<dyn CacheStorage> = Arc::new(
            FsCacheStorage::new(cache_dir.clone())
                .with_context(|| format!("Failed to open cache directory: {}", cache_dir.display()))?,
        );

        let store_dir = config.store_dir()?;
        let kv: Arc<dyn KeyValueStore> = Arc::new(
            JsonFileStore::new(store_dir.clone())
                .with_context(|| format!("Failed to open store directory: {}", store_dir.display()))?,
        );

        let cache = CacheManager::new(
            config.cache.clone(),
            Arc::clone(&transport),
            storage,
            Arc::clone(&kv),
        )?;

        Ok(Self {
            config,
            transport,
            kv,
            cache,
        })
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Install => self.install().await,
            Command::Activate => self.activate().await,
            Command::Fetch { url, document } => self.fetch(url, document).await,
            Command::Ask { query, offline } => self.ask(&query.join(" "), offline).await,
            Command::Sync { watch } => self.sync(watch).await,
            Command::Status => self.status(),
            Command::Results { command } => self.results(command),
        }
    }

    async fn install(&self) -> Result<()> {
        match self.cache.dispatch(LifecycleEvent::Install).await? {
            EventOutcome::Installed { entries } => {
                println!("Installed {} ({} entries)", self.cache.version(), entries);
            }
            other => debug!(outcome = ?other, "Unexpected install outcome"),
        }
        Ok(())
    }

    async fn activate(&self) -> Result<()> {
        if let EventOutcome::Activated { deleted } = self.cache.dispatch(LifecycleEvent::Activate).await? {
            println!("Active: {}", self.cache.version());
            for name in deleted {
                println!("  deleted {}", name);
            }
        }
        Ok(())
    }

    /// A generation left by an earlier run resumes serving without a new install.
    async fn ensure_active(&self) -> Result<()> {
        if let LifecycleState::Installed(_) = self.cache.state() {
            info!(version = %self.cache.version(), "Resuming installed generation");
            self.cache.dispatch(LifecycleEvent::Activate).await?;
        }
        Ok(())
    }

    async fn fetch(&self, url: String, document: bool) -> Result<()> {
        self.ensure_active().await?;
        let request = if document {
            Request::document(url)
        } else {
            Request::new(url)
        };

        if let EventOutcome::Response(response) = self.cache.dispatch(LifecycleEvent::Fetch(request)).await? {
            eprintln!(
                "{} {:?} {}",
                response.status,
                response.response_type,
                response.content_type.as_deref().unwrap_or("-")
            );
            println!("{}", response.text());
        }
        Ok(())
    }

    async fn ask(&self, query: &str, offline: bool) -> Result<()> {
        let search = FallbackSearch::initialize(
            self.config.search.clone(),
            Arc::clone(&self.transport),
            Arc::clone(&self.kv),
        )
        .await;

        // Corpus loading just went through the same transport
        let online = !offline && self.transport.is_online();
        let answer = search.answer(query, online).await;
        println!("{}", answer.text);
        match answer.score {
            Some(score) => eprintln!("[{} {:.3}]", answer.source, score),
            None => eprintln!("[{}]", answer.source),
        }
        Ok(())
    }

    async fn sync(&self, watch_mode: bool) -> Result<()> {
        if !watch_mode {
            if let EventOutcome::Synced(ok) = self
                .cache
                .dispatch(LifecycleEvent::Sync(BACKGROUND_SYNC_TAG.to_string()))
                .await?
            {
                if !ok {
                    anyhow::bail!("Contacts sync failed; the previous copy is kept");
                }
                println!("Emergency contacts synced");
            }
            return Ok(());
        }

        let interval = Duration::from_secs(self.config.cache.sync_interval_secs.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = self.cache.background_sync().spawn_periodic(interval, shutdown_rx);
        eprintln!("Syncing every {}s, Ctrl-C to stop", interval.as_secs());

        tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
        let _ = shutdown_tx.send(true);
        handle.await.context("Sync loop panicked")?;
        Ok(())
    }

    fn status(&self) -> Result<()> {
        let summary = self.cache.summary()?;
        println!("Cache:     {} [{}]", summary.version, summary.state);
        println!("  entries: {} (updated {})", summary.entry_count, summary.last_updated());
        println!("  generations on disk: {}", summary.generations.join(", "));

        match self.cache.emergency_contacts() {
            Some(contacts) => {
                let stale = if self.cache.contacts_are_stale() { " (stale, run `readykit sync`)" } else { "" };
                println!("Contacts:  synced {}{}", contacts.age_display(), stale);
            }
            None => println!("Contacts:  never synced"),
        }

        let results = ResultStore::new(Arc::clone(&self.kv)).list_all()?;
        println!("Results:   {} stored", results.len());
        Ok(())
    }

    fn results(&self, command: ResultsCommand) -> Result<()> {
        let store = ResultStore::new(Arc::clone(&self.kv));
        match command {
            ResultsCommand::List { user, kind, json } => {
                let kind = kind.map(ResultKind::from);
                let mut records = store.filter(|r| {
                    kind.map_or(true, |k| r.kind == k)
                        && user.as_deref().map_or(true, |u| r.user() == Some(u))
                })?;
                newest_first(&mut records);

                if json {
                    println!("{}", serde_json::to_string_pretty(&records)?);
                    return Ok(());
                }
                for record in &records {
                    let when = record
                        .timestamp
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    let score = match (record.total, record.percentage()) {
                        (Some(total), Some(pct)) => format!("{}/{} ({:.0}%)", record.score, total, pct),
                        _ => record.score.to_string(),
                    };
                    println!(
                        "{}  {:<4}  {:<16}  {:<12}  {}",
                        when,
                        record.kind,
                        record.subject_id,
                        score,
                        record.user().unwrap_or("-")
                    );
                }
                eprintln!("{} result(s)", records.len());
            }
            ResultsCommand::Add {
                kind,
                subject,
                score,
                total,
                user,
            } => {
                let session = user.map(|email| Session::new(email, Role::Student));
                let record = ResultRecord::new(kind.into(), subject, score).tagged_with(session.as_ref());
                let record = match total {
                    Some(total) => record.with_total(total),
                    None => record,
                };
                let stored = store.try_append(record).context("Failed to save result")?;
                println!("{}", stored.id.unwrap_or_default());
            }
        }
        Ok(())
    }
}
