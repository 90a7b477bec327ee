//! Runtime configuration.
//!
//! Everything the pipeline needs to know about endpoints, credentials and
//! file locations lives in [`Config`]. It is read from an optional YAML file,
//! then selectively overridden by CLI flags and environment variables (see
//! [`Config::apply_cli`]). Every field has a default, so an empty file or no
//! file at all is a valid configuration.

use crate::cli::Cli;
use crate::error::ConfigError;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, instrument};

/// Browser user agent sent with every listing and document request.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fetch: FetchConfig,
    /// Aggregate ledger of already-published records, consulted read-only.
    pub ledger_path: PathBuf,
    /// Directory receiving the `new_notification_<source>.json` files.
    pub output_dir: PathBuf,
    /// When set, examine at most this many candidates per source and skip
    /// known ones instead of stopping at the first known one.
    pub scan_depth: Option<usize>,
    pub llm: LlmConfig,
    pub discovery: DiscoveryConfig,
    pub telegram: TelegramConfig,
    pub news: NewsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            ledger_path: PathBuf::from("cyberattacks.json"),
            output_dir: PathBuf::from("."),
            scan_depth: None,
            llm: LlmConfig::default(),
            discovery: DiscoveryConfig::default(),
            telegram: TelegramConfig::default(),
            news: NewsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Retries after the first attempt for transient failures.
    pub retries: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
            retries: 2,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Usually supplied through `--llm-api-key` / `LLM_API_KEY` instead.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            api_key: None,
            timeout_secs: 60,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Scrape a search engine as the third strategy. Off by default because
    /// search engines rate-limit scripted traffic.
    pub web_search: bool,
    pub lookup_timeout_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            web_search: false,
            lookup_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub feeds: Vec<String>,
    /// Publisher names (the RSS `<source>` text) that are never triaged.
    pub ignored_sources: Vec<String>,
    pub seen_items_path: PathBuf,
    pub likely_feed_path: PathBuf,
    pub unlikely_feed_path: PathBuf,
    pub retention_days: i64,
    /// Model used for headline assessment; falls back to `llm.model`.
    pub model: Option<String>,
}

impl Default for NewsConfig {
    fn default() -> Self {
        let feeds = [
            ("cyber+attack", "en-US", "US", "US:en"),
            ("cyber+attack", "en-GB", "GB", "GB:en"),
            ("cyber+attack", "en-CA", "CA", "CA:en"),
            ("cyber+attack", "en-AU", "AU", "AU:en"),
            ("cyber+attack", "en-IN", "IN", "IN:en"),
            ("cyber+attaque", "fr-FR", "FR", "FR:fr"),
            ("cyber+angriff", "de-DE", "DE", "DE:de"),
            ("ataque+cibernetico", "es-ES", "ES", "ES:es"),
            ("attacco+informatico", "it", "IT", "IT:it"),
            ("cyberaanval", "nl", "NL", "NL:nl"),
        ]
        .iter()
        .map(|(q, hl, gl, ceid)| {
            format!(
                "https://news.google.com/rss/search?tbm=nws&q=when:12h+{q}&scoring=n&hl={hl}&gl={gl}&ceid={ceid}"
            )
        })
        .collect();

        let ignored_sources = [
            "GlobeNewswire",
            "PR Newswire",
            "PR Newswire UK",
            "PR Newswire Asia",
            "Business Wire",
            "businesswire.com",
            "Canada NewsWire",
            "openPR",
            "PR Web",
            "PR TIMES",
            "PRWire",
            "ESET",
            "TEISS",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        Self {
            feeds,
            ignored_sources,
            seen_items_path: PathBuf::from("seen_items.txt"),
            likely_feed_path: PathBuf::from("cyberattacks_news.xml"),
            unlikely_feed_path: PathBuf::from("unlikely_cyberattacks_news.xml"),
            retention_days: 28,
            model: None,
        }
    }
}

impl Config {
    /// Load from `path`, or return defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("No config file given; using defaults");
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        info!(path, "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Let explicit flags and environment variables win over the file.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(ledger) = &cli.ledger {
            self.ledger_path = PathBuf::from(ledger);
        }
        if let Some(dir) = &cli.output_dir {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(depth) = cli.scan_depth {
            self.scan_depth = Some(depth);
        }
        if cli.web_search {
            self.discovery.web_search = true;
        }
        if let Some(key) = &cli.llm_api_key {
            self.llm.api_key = Some(key.clone());
        }
        if let Some(token) = &cli.telegram_token {
            self.telegram.bot_token = Some(token.clone());
        }
        if let Some(chat_id) = &cli.telegram_chat_id {
            self.telegram.chat_id = Some(chat_id.clone());
        }
    }
}
