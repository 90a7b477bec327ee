//! Vermont Attorney General security breach notices (RSS).
//!
//! Feed items link to a notice page that carries the letter as a PDF
//! attachment. The record keeps the notice page as its identity and the
//! feed item title as its title.

use super::table::element_text;
use super::SourceAdapter;
use crate::error::SourceError;
use crate::extract::RecordExtractor;
use crate::models::{BreachCandidate, BreachRecord, Capability, SourceDescriptor};
use crate::utils::resolve_url;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

pub const FEED_URL: &str = "https://ago.vermont.gov/taxonomy/term/10/feed";
const SITE_ROOT: &str = "https://ago.vermont.gov";

static PDF_ATTACHMENT: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("span.file--application-pdf a").expect("static attachment selector")
});

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

/// Items published on `yesterday` in local time.
pub fn parse_feed(xml: &str, yesterday: NaiveDate) -> Result<Vec<BreachCandidate>, SourceError> {
    let rss: Rss = quick_xml::de::from_str(xml)
        .map_err(|e| SourceError::structure("Vermont", format!("unparseable feed: {e}")))?;

    let mut candidates = Vec::new();
    for item in rss.channel.items {
        let (Some(title), Some(link), Some(pub_date)) = (item.title, item.link, item.pub_date) else {
            debug!("Skipping incomplete feed item");
            continue;
        };
        let published = match DateTime::parse_from_rfc2822(pub_date.trim()) {
            Ok(dt) => dt.with_timezone(&Local).date_naive(),
            Err(e) => {
                debug!(%pub_date, error = %e, "Skipping item with unparseable pubDate");
                continue;
            }
        };
        if published != yesterday {
            continue;
        }
        candidates.push(BreachCandidate {
            source_identifier: "Vermont".to_string(),
            organization_name: title.trim().to_string(),
            occurrence_date_text: published.format("%Y-%m-%d").to_string(),
            canonical_url: Some(link.trim().to_string()),
        });
    }

    info!(count = candidates.len(), "Parsed Vermont feed");
    Ok(candidates)
}

/// Absolute URL of the PDF attached to a notice page.
pub fn attachment_url(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let anchor = document.select(&PDF_ATTACHMENT).next()?;
    debug!(text = %element_text(anchor), "Found PDF attachment");
    resolve_url(SITE_ROOT, anchor.value().attr("href")?)
}

pub struct Vermont {
    descriptor: SourceDescriptor,
    extractor: Arc<RecordExtractor>,
    yesterday: NaiveDate,
}

impl Vermont {
    pub fn new(extractor: Arc<RecordExtractor>, yesterday: NaiveDate) -> Self {
        Self {
            descriptor: SourceDescriptor::new("Vermont", FEED_URL, Capability::RssFeed),
            extractor,
            yesterday,
        }
    }
}

#[async_trait]
impl SourceAdapter for Vermont {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    #[instrument(level = "info", skip_all, fields(source = "Vermont"))]
    async fn enumerate(&self) -> Result<Vec<BreachCandidate>, SourceError> {
        let xml = self.extractor.fetcher().text(FEED_URL).await?;
        parse_feed(&xml, self.yesterday)
    }

    #[instrument(level = "info", skip_all, fields(title = %candidate.organization_name))]
    async fn extract(&self, candidate: &BreachCandidate) -> Option<BreachRecord> {
        let notice_url = self.identity_url(candidate)?;
        let html = match self.extractor.fetcher().text(&notice_url).await {
            Ok(html) => html,
            Err(e) => {
                error!(error = %e, "Failed to fetch notice page");
                return None;
            }
        };
        let Some(pdf_url) = attachment_url(&html) else {
            warn!(url = %notice_url, "No PDF attachment on notice page");
            return None;
        };

        let mut record = self.extractor.extract_pdf(&pdf_url).await?;
        record.url = notice_url;
        record.title = candidate.organization_name.clone();
        record.pdf_url = Some(pdf_url);
        Some(record)
    }
}
