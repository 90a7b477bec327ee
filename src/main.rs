//! # cyberwatch
//!
//! Watches government breach-notification listings and cyberattack news,
//! extracts structured records with an LLM, and announces the new ones.
//!
//! ## Features
//!
//! - Seven state sources (Maine, Washington, California, Idaho, Iowa,
//!   Vermont, New Hampshire) read from HTML tables, an RSS feed or a JSON API
//! - PDF notices are reduced to text and summarized into victim, date and
//!   domain by an OpenAI-compatible model
//! - Victim domains are discovered and checked against DNS
//! - New records are appended to per-source JSON files and announced on Telegram
//! - `--news` triages Google News search feeds into two RSS feeds
//!
//! ## Usage
//!
//! ```sh
//! cyberwatch                       # every source
//! cyberwatch iowa -l ledger.json   # one source, custom ledger
//! cyberwatch --news                # news triage
//! ```
//!
//! ## Architecture
//!
//! 1. **Enumerate**: each source adapter lists candidates newest-first
//! 2. **Deduplicate**: candidates are checked against the aggregate ledger
//! 3. **Extract**: new notices are fetched and turned into records
//! 4. **Output**: records are persisted and one summary is sent per source

use clap::Parser;
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod api;
mod cli;
mod config;
mod discovery;
mod error;
mod extract;
mod fetch;
mod ledger;
mod models;
mod news;
mod notify;
mod outputs;
mod pipeline;
mod retry;
mod sources;
mod utils;

use api::{LanguageModel, OpenAiClient, RetryAsk};
use cli::Cli;
use config::Config;
use discovery::{DnsResolver, DomainDiscovery};
use extract::RecordExtractor;
use fetch::{Fetch, HttpFetcher};
use ledger::Ledger;
use news::NewsTriage;
use notify::TelegramNotifier;
use outputs::json::JsonFileSink;
use pipeline::{Pipeline, StopPolicy};
use sources::{build_adapter, SourceAdapter, SourceName};
use utils::ensure_writable_dir;

/// Model client wrapped in the retrying decorator, or `None` when the
/// endpoint is not configured.
fn build_model(config: &Config, model_override: Option<&str>) -> Option<Arc<dyn LanguageModel>> {
    match OpenAiClient::from_config(&config.llm) {
        Ok(client) => {
            let client = match model_override {
                Some(model) => client.with_model(model),
                None => client,
            };
            info!(model = %client.model(), "Language model configured");
            let model: Arc<dyn LanguageModel> = Arc::new(RetryAsk::new(
                client,
                config.llm.max_retries,
                Duration::from_secs(1),
            ));
            Some(model)
        }
        Err(e) => {
            warn!(error = %e, "Language model unavailable; records will carry empty metadata");
            None
        }
    }
}

async fn run_news(config: &Config, fetch: &dyn Fetch) -> Result<ExitCode, Box<dyn Error>> {
    let Some(model) = build_model(config, config.news.model.as_deref()) else {
        error!("News triage needs a language model; set --llm-api-key or LLM_API_KEY");
        return Ok(ExitCode::from(1));
    };
    let report = NewsTriage::new(fetch, model.as_ref(), &config.news).run().await?;
    debug!(?report, "News triage report");
    Ok(ExitCode::SUCCESS)
}

async fn run_sources(
    config: &Config,
    fetch: Arc<dyn Fetch>,
    selected: Option<SourceName>,
) -> Result<ExitCode, Box<dyn Error>> {
    if let Err(e) = ensure_writable_dir(&config.output_dir).await {
        error!(
            path = %config.output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let mut discovery = DomainDiscovery::new(Arc::new(DnsResolver::new(Duration::from_secs(
        config.discovery.lookup_timeout_secs,
    ))));
    if config.discovery.web_search {
        discovery = discovery.with_web_search(Arc::clone(&fetch));
    }
    let extractor = Arc::new(RecordExtractor::new(
        Arc::clone(&fetch),
        build_model(config, None),
        discovery,
    ));

    let ledger = Ledger::load(&config.ledger_path);
    info!(known = ledger.len(), path = %config.ledger_path.display(), "Loaded ledger");
    if ledger.is_empty() {
        warn!("Ledger is empty; every listed notice counts as new");
    }

    let sink = JsonFileSink::new(config.output_dir.clone());
    let notifier = TelegramNotifier::new(&config.telegram);

    let yesterday = utils::yesterday();
    let names = match selected {
        Some(name) => vec![name],
        None => SourceName::ALL.to_vec(),
    };
    let adapters: Vec<Box<dyn SourceAdapter>> = names
        .into_iter()
        .map(|name| build_adapter(name, Arc::clone(&extractor), yesterday))
        .collect();
    info!(sources = adapters.len(), %yesterday, "Processing sources");

    let summary = Pipeline::new(
        &ledger,
        &sink,
        &notifier,
        StopPolicy::from_scan_depth(config.scan_depth),
    )
    .run_all(&adapters)
    .await;

    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        records = summary.records,
        "Sources processed"
    );
    if summary.all_succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

#[tokio::main]
#[instrument]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("cyberwatch starting up");

    let args = Cli::parse();
    debug!(source = ?args.source, news = args.news, "Parsed CLI arguments");

    let mut config = Config::load(args.config.as_deref())?;
    config.apply_cli(&args);

    let fetch: Arc<dyn Fetch> = Arc::new(HttpFetcher::new(&config.fetch)?);

    let code = if args.news {
        run_news(&config, fetch.as_ref()).await?
    } else {
        run_sources(&config, fetch, args.source).await?
    };

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(code)
}
