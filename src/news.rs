//! News triage: sort cyberattack headlines from news search feeds into a
//! "likely" and an "unlikely" RSS feed.
//!
//! # Flow
//!
//! 1. Fetch every configured search feed (a failing feed is skipped)
//! 2. Drop items from ignored publishers
//! 3. Cut the publisher suffix off the title to get the headline
//! 4. Skip headlines already seen; mark new ones seen immediately
//! 5. Ask the model whether the headline reports an actual attack
//! 6. Decode aggregator links to the publisher's URL when possible
//! 7. Merge into the existing feeds, prune old entries, rewrite both files
//!
//! The seen store is a text file of SHA-256 hex digests, one per line.

use crate::api::{ChatRequest, LanguageModel};
use crate::config::NewsConfig;
use crate::error::NewsError;
use crate::fetch::Fetch;
use crate::outputs::rss::{self, Channel, Item, Rss};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use chrono::{Duration, Local, Utc};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

const GOOGLE_NEWS_ARTICLE_PREFIX: &str = "https://news.google.com/rss/articles/";

static DECODED_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s-u)^\x08\x13".+?(?P<primary_url>http[^\xd2]+)\xd2\x01"#)
        .expect("static decoded url regex")
});

/// URL-safe alphabet, padding optional.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Headline part of an aggregated title: everything before the earlier of
/// `" - "` and `" | "`.
///
/// `"Hospital hit by ransomware - The Daily Paper"` -> `"Hospital hit by ransomware"`
pub fn headline(title: &str) -> &str {
    let cut = [title.find(" - "), title.find(" | ")].into_iter().flatten().min();
    match cut {
        Some(i) => &title[..i],
        None => title,
    }
}

/// Hex SHA-256 of a headline, the key of the seen store.
pub fn headline_hash(headline: &str) -> String {
    hex::encode(Sha256::digest(headline.as_bytes()))
}

/// Publisher URL embedded in a Google News article link, when the link
/// uses the older self-contained encoding.
pub fn decode_google_news_url(link: &str) -> Option<String> {
    let encoded = link.strip_prefix(GOOGLE_NEWS_ARTICLE_PREFIX)?;
    let encoded = encoded.split('?').next().unwrap_or_default().trim_end_matches('=');
    let decoded = URL_SAFE_LENIENT.decode(encoded).ok()?;
    let caps = DECODED_URL_RE.captures(&decoded)?;
    String::from_utf8(caps.name("primary_url")?.as_bytes().to_vec()).ok()
}

/// Headlines already triaged, persisted as one hash per line.
#[derive(Debug)]
pub struct SeenStore {
    path: PathBuf,
    hashes: HashSet<String>,
}

impl SeenStore {
    /// Load the store; a missing file is an empty store.
    pub async fn load(path: &Path) -> Result<Self, NewsError> {
        let hashes = match fs::read_to_string(path).await {
            Ok(raw) => raw
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(source) => {
                return Err(NewsError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            hashes,
        })
    }

    pub fn contains(&self, headline: &str) -> bool {
        self.hashes.contains(&headline_hash(headline))
    }

    /// Record `headline` in memory and append it to the file.
    pub async fn mark(&mut self, headline: &str) -> Result<(), NewsError> {
        let hash = headline_hash(headline);
        if !self.hashes.insert(hash.clone()) {
            return Ok(());
        }
        let io_err = |source: std::io::Error| NewsError::Io {
            path: self.path.display().to_string(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_err)?;
        file.write_all(format!("{hash}\n").as_bytes()).await.map_err(io_err)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }
}

/// The model's verdict on a headline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assessment {
    Likely,
    Unlikely,
    No,
}

impl Assessment {
    /// Read a short model answer. Anything unrecognized counts as `No`.
    pub fn from_answer(answer: &str) -> Self {
        let word = answer
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        match word.as_str() {
            "likely" => Assessment::Likely,
            "unlikely" => Assessment::Unlikely,
            "no" => Assessment::No,
            other => {
                debug!(answer = %other, "Unrecognized assessment");
                Assessment::No
            }
        }
    }

    pub fn is_likely(self) -> bool {
        self == Assessment::Likely
    }
}

fn assessment_system_prompt() -> String {
    format!(
        "You are a technology journalist specialized in enterprise IT and in particular cybersecurity. \
         One of your tasks is to produce a press review of cyberattacks reported around the world in the media. \
         You must evaluate article headlines and say whether, in your opinion, the headline suggests the article \
         is likely about an actual cyberattack (confirmed or suspected), and not a statistic, a product, or a market study. \
         For each headline, you may only answer \"likely\", \"unlikely\" or \"no\". Today's date: {}.",
        Local::now().format("%Y-%m-%d")
    )
}

/// Counts from one triage run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriageReport {
    pub fetched: usize,
    pub ignored: usize,
    pub already_seen: usize,
    pub likely: usize,
    pub unlikely: usize,
}

fn likely_channel() -> Channel {
    Channel {
        title: "Cyberattacks News".to_string(),
        link: "https://news.google.com/".to_string(),
        description: "Aggregated likely cyberattacks news feed".to_string(),
        language: Some("en".to_string()),
        items: Vec::new(),
    }
}

fn unlikely_channel() -> Channel {
    Channel {
        title: "Cyberattacks News (low likeliness)".to_string(),
        link: "https://news.google.com/".to_string(),
        description: "Aggregated unlikely cyberattacks news feed".to_string(),
        language: Some("en".to_string()),
        items: Vec::new(),
    }
}

/// Triage of the configured news feeds.
pub struct NewsTriage<'a> {
    fetch: &'a dyn Fetch,
    model: &'a dyn LanguageModel,
    config: &'a NewsConfig,
}

impl<'a> NewsTriage<'a> {
    pub fn new(fetch: &'a dyn Fetch, model: &'a dyn LanguageModel, config: &'a NewsConfig) -> Self {
        Self { fetch, model, config }
    }

    /// Items of every feed that could be fetched and parsed.
    async fn collect_items(&self) -> Vec<Item> {
        let mut items = Vec::new();
        for url in &self.config.feeds {
            let xml = match self.fetch.text(url).await {
                Ok(xml) => xml,
                Err(e) => {
                    warn!(%url, error = %e, "Feed fetch failed; skipping");
                    continue;
                }
            };
            match Rss::parse(&xml) {
                Ok(rss) => {
                    debug!(%url, count = rss.channel.items.len(), "Fetched feed");
                    items.extend(rss.channel.items);
                }
                Err(e) => warn!(%url, error = %e, "Feed parse failed; skipping"),
            }
        }
        items
    }

    async fn assess(&self, headline: &str) -> Assessment {
        let request = ChatRequest::new(assessment_system_prompt(), headline)
            .temperature(0.1)
            .max_tokens(5);
        match self.model.complete(&request).await {
            Ok(answer) => Assessment::from_answer(&answer),
            Err(e) => {
                warn!(%headline, error = %e, "Assessment failed; filing as unlikely");
                Assessment::No
            }
        }
    }

    #[instrument(level = "info", skip_all)]
    pub async fn run(&self) -> Result<TriageReport, NewsError> {
        let mut report = TriageReport::default();
        let mut likely = Rss::new(Channel {
            items: rss::read_items(&self.config.likely_feed_path).await,
            ..likely_channel()
        });
        let mut unlikely = Rss::new(Channel {
            items: rss::read_items(&self.config.unlikely_feed_path).await,
            ..unlikely_channel()
        });
        let mut seen = SeenStore::load(&self.config.seen_items_path).await?;
        info!(seen = seen.len(), "Loaded seen headlines");

        let items = self.collect_items().await;
        report.fetched = items.len();

        for item in items {
            if item
                .source_name()
                .is_some_and(|s| self.config.ignored_sources.iter().any(|i| i == s))
            {
                report.ignored += 1;
                continue;
            }
            let headline = headline(&item.title).trim().to_string();
            if headline.is_empty() || seen.contains(&headline) {
                report.already_seen += 1;
                continue;
            }
            seen.mark(&headline).await?;

            let assessment = self.assess(&headline).await;
            let link = decode_google_news_url(&item.link).unwrap_or_else(|| item.link.clone());
            let published = item.published().unwrap_or_else(|| Utc::now().fixed_offset());
            let entry = Item::new(headline.clone(), link, published);

            info!(%headline, ?assessment, "Assessed headline");
            if assessment.is_likely() {
                likely.channel.items.push(entry);
                report.likely += 1;
            } else {
                unlikely.channel.items.push(entry);
                report.unlikely += 1;
            }
        }

        let cutoff = Utc::now() - Duration::days(self.config.retention_days);
        for (feed, path) in [
            (&mut likely, &self.config.likely_feed_path),
            (&mut unlikely, &self.config.unlikely_feed_path),
        ] {
            let pruned = feed.prune_older_than(cutoff);
            if pruned > 0 {
                info!(pruned, path = %path.display(), "Pruned old entries");
            }
            rss::write_feed(path, feed).await?;
        }

        info!(
            fetched = report.fetched,
            likely = report.likely,
            unlikely = report.unlikely,
            "News triage finished"
        );
        Ok(report)
    }
}
