//! Application configuration management.
//!
//! Configuration is stored at `~/.config/readykit/config.json` and falls back
//! to built-in defaults when the file is absent. A handful of environment
//! variables override the file (`READYKIT_ORIGIN`, `READYKIT_DATA_DIR`).
//!
//! Each component takes its own section (`CacheConfig`, `SearchConfig`) so it
//! never has to reach for global state.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "readykit";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Bump whenever the asset list changes so clients drop the old generation.
pub const CACHE_VERSION: &str = "readykit-v1";

/// Assets required for offline operation.
pub const DEFAULT_ASSETS: &[&str] = &[
    "/",
    "/index.html",
    "/static/js/bundle.js",
    "/static/css/main.css",
    "/data/disasters.json",
    "/data/contacts.json",
    "/data/faq.json",
    "/data/quizzes/earthquake.json",
    "/data/quizzes/fire.json",
    "/data/quizzes/flood.json",
    "/data/quizzes/cyclone.json",
    "/data/quizzes/tsunami.json",
    "/manifest.json",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub version: String,
    pub assets: Vec<String>,
    /// Document served when a navigation fails offline.
    pub app_shell: String,
    /// Resource re-fetched into the key-value area by background sync.
    pub critical_resource: String,
    pub sync_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION.to_string(),
            assets: DEFAULT_ASSETS.iter().map(|s| s.to_string()).collect(),
            app_shell: "/index.html".to_string(),
            critical_resource: "/data/contacts.json".to_string(),
            sync_interval_secs: 15 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalSearchConfig {
    pub enabled: bool,
    /// Keyword search endpoint returning ranked page titles.
    pub search_url: String,
    /// Summary endpoint; the title is appended as a path segment.
    pub summary_url: String,
}

impl Default for ExternalSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            search_url: "https://en.wikipedia.org/w/api.php".to_string(),
            summary_url: "https://en.wikipedia.org/api/rest_v1/page/summary".to_string(),
        }
    }
}

/// Tuning for the fallback search chain. Scores are distances: lower is closer.
/// The threshold defaults are empirical.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Where the FAQ corpus is fetched from when the local store is empty.
    pub corpus_url: String,
    /// Raw match cutoff applied inside the matcher.
    pub match_threshold: f64,
    /// Acceptance cutoff for the whole-phrase stage (T1).
    pub phrase_threshold: f64,
    /// Acceptance cutoff for the per-token stage (T2). Stricter than T1.
    pub token_threshold: f64,
    pub min_match_char_len: usize,
    pub min_token_len: usize,
    pub fallback_message: String,
    pub external: ExternalSearchConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            corpus_url: "/data/faq.json".to_string(),
            match_threshold: 0.5,
            phrase_threshold: 0.7,
            token_threshold: 0.65,
            min_match_char_len: 2,
            min_token_len: 3,
            fallback_message: "Sorry, no confident answer was found. Try different keywords, \
                               or ask again once you are online."
                .to_string(),
            external: ExternalSearchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL relative asset paths resolve against.
    pub origin: String,
    /// Overrides the platform data directory.
    pub data_dir: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub cache: CacheConfig,
    pub search: SearchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: "http://localhost:5173".to_string(),
            data_dir: None,
            request_timeout_secs: 30,
            cache: CacheConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(origin) = std::env::var("READYKIT_ORIGIN") {
            if !origin.is_empty() {
                self.origin = origin;
            }
        }
        if let Ok(dir) = std::env::var("READYKIT_DATA_DIR") {
            if !dir.is_empty() {
                self.data_dir = Some(PathBuf::from(dir));
            }
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir =
            dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Directory holding cache generations.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("caches"))
    }

    /// Directory holding the key-value area.
    pub fn store_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("store"))
    }
}
