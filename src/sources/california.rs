//! California Attorney General data security breach list.
//!
//! Rows are `organization | breach date(s) | reported date`. Each
//! organization links to a notice page that lists one or more PDFs; the
//! individual notification letter is preferred. The record keeps the notice
//! page as its identity and the chosen PDF in `pdf_url`.

use super::table::{element_text, find_rows};
use super::SourceAdapter;
use crate::error::SourceError;
use crate::extract::RecordExtractor;
use crate::models::{BreachCandidate, BreachRecord, Capability, SourceDescriptor};
use crate::utils::resolve_url;
use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

pub const LISTING_URL: &str = "https://oag.ca.gov/privacy/databreach/list";
const SITE_ROOT: &str = "https://oag.ca.gov";

/// Link texts that mark the letter sent to individuals.
const PREFERRED_KEYWORDS: [&str; 5] = ["individual", "notification", "letter", "notice", "sample"];

static TABLE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("table.views-table.cols-3.table.table-hover.table-striped")
        .expect("static table selector")
});
static HREF: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("static a selector"));

/// Rows reported on `yesterday` (`MM/DD/YYYY` in column 2) that carry a link.
pub fn parse_listing(html: &str, yesterday: NaiveDate) -> Result<Vec<BreachCandidate>, SourceError> {
    let rows = find_rows(html, &TABLE, false)
        .ok_or_else(|| SourceError::structure("California", "breach table not found"))?;
    let wanted = yesterday.format("%m/%d/%Y").to_string();

    let mut candidates = Vec::new();
    for cells in rows.iter().filter(|cells| cells.len() >= 3) {
        if cells[2].text != wanted {
            debug!(reported = %cells[2].text, "Skipping notice not reported yesterday");
            continue;
        }
        let (name, href) = cells[0].name_and_href();
        match href {
            Some(href) if !name.is_empty() => {
                info!(organization = %name, breach_dates = %cells[1].text, "Added notification");
                candidates.push(BreachCandidate {
                    source_identifier: "California".to_string(),
                    organization_name: name,
                    occurrence_date_text: cells[2].text.clone(),
                    canonical_url: Some(href),
                });
            }
            _ => warn!(organization = %name, "Row without a notice link"),
        }
    }

    info!(count = candidates.len(), date = %wanted, "Parsed California listing");
    Ok(candidates)
}

/// The PDF to extract from a notice page: the first one whose link text
/// names the individual letter, otherwise the first PDF.
pub fn choose_pdf(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let pdfs: Vec<(String, String)> = document
        .select(&HREF)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim();
            href.to_lowercase()
                .ends_with(".pdf")
                .then(|| resolve_url(SITE_ROOT, href))
                .flatten()
                .map(|url| (url, element_text(a).to_lowercase()))
        })
        .collect();

    pdfs.iter()
        .find(|(_, text)| PREFERRED_KEYWORDS.iter().any(|k| text.contains(k)))
        .or_else(|| pdfs.first())
        .map(|(url, _)| url.clone())
}

pub struct California {
    descriptor: SourceDescriptor,
    extractor: Arc<RecordExtractor>,
    yesterday: NaiveDate,
}

impl California {
    pub fn new(extractor: Arc<RecordExtractor>, yesterday: NaiveDate) -> Self {
        Self {
            descriptor: SourceDescriptor::new("California", LISTING_URL, Capability::HtmlTable),
            extractor,
            yesterday,
        }
    }
}

#[async_trait]
impl SourceAdapter for California {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    #[instrument(level = "info", skip_all, fields(source = "California"))]
    async fn enumerate(&self) -> Result<Vec<BreachCandidate>, SourceError> {
        let html = self.extractor.fetcher().text(LISTING_URL).await?;
        parse_listing(&html, self.yesterday)
    }

    #[instrument(level = "info", skip_all, fields(victim = %candidate.organization_name))]
    async fn extract(&self, candidate: &BreachCandidate) -> Option<BreachRecord> {
        let notice_url = self.identity_url(candidate)?;
        let html = match self.extractor.fetcher().text(&notice_url).await {
            Ok(html) => html,
            Err(e) => {
                error!(error = %e, "Failed to fetch notice page");
                return None;
            }
        };
        let Some(pdf_url) = choose_pdf(&html) else {
            warn!(url = %notice_url, "No PDF linked from notice page");
            return None;
        };

        let mut record = self.extractor.extract_pdf(&pdf_url).await?;
        record.url = notice_url;
        record.pdf_url = Some(pdf_url);
        Some(record)
    }
}
