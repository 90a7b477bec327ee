//! Command-line interface definitions for cyberwatch.
//!
//! All secrets can be provided via flags or environment variables; paths
//! given here override the YAML configuration file.

use crate::sources::SourceName;
use clap::Parser;

/// Command-line arguments for cyberwatch.
///
/// # Examples
///
/// ```sh
/// # Process every breach-notification source
/// cyberwatch
///
/// # Only Maine, with a custom ledger
/// cyberwatch maine --ledger ./data/cyberattacks.json
///
/// # Triage the news feeds instead
/// cyberwatch --news
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Source to monitor (all sources when omitted)
    #[arg(value_enum, conflicts_with = "news")]
    pub source: Option<SourceName>,

    /// Run the news-feed triage pipeline instead of the breach sources
    #[arg(long)]
    pub news: bool,

    /// Optional path to a config.yaml file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Aggregate ledger of already-published records (JSON array)
    #[arg(short, long)]
    pub ledger: Option<String>,

    /// Directory receiving the per-source output files
    #[arg(short, long)]
    pub output_dir: Option<String>,

    /// Examine at most N candidates per source, skipping known ones,
    /// instead of stopping at the first known one
    #[arg(long)]
    pub scan_depth: Option<usize>,

    /// Enable the web-search step of domain discovery
    #[arg(long)]
    pub web_search: bool,

    /// API key for the OpenAI-compatible model endpoint
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    /// Telegram bot token
    #[arg(long, env = "TG_TK", hide_env_values = true)]
    pub telegram_token: Option<String>,

    /// Telegram chat id
    #[arg(long, env = "TG_CHAT_ID")]
    pub telegram_chat_id: Option<String>,
}
