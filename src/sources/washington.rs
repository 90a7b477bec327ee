//! Washington Attorney General data breach notifications.
//!
//! The table has no posting date to filter on, so every row is a candidate
//! and the stop-at-first-seen rule alone bounds the work. Organization links
//! point straight at the notification letter.

use super::table::find_rows;
use super::SourceAdapter;
use crate::error::SourceError;
use crate::extract::RecordExtractor;
use crate::models::{BreachCandidate, BreachRecord, Capability, SourceDescriptor};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::Selector;
use std::sync::Arc;
use tracing::{info, instrument};

pub const LISTING_URL: &str = "https://www.atg.wa.gov/data-breach-notifications";

static TABLE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("table.tablesaw.tablesaw-stack.cols-5").expect("static table selector")
});

/// Column 1 holds the organization and letter link, column 2 the date.
pub fn parse_listing(html: &str) -> Result<Vec<BreachCandidate>, SourceError> {
    let rows = find_rows(html, &TABLE, true)
        .ok_or_else(|| SourceError::structure("Washington", "no table rows found"))?;

    let candidates: Vec<BreachCandidate> = rows
        .iter()
        .filter(|cells| cells.len() >= 3)
        .filter_map(|cells| {
            let (name, href) = cells[1].name_and_href();
            let date = cells[2].text.clone();
            (!name.is_empty() && !date.is_empty()).then(|| BreachCandidate {
                source_identifier: "Washington".to_string(),
                organization_name: name,
                occurrence_date_text: date,
                canonical_url: href,
            })
        })
        .collect();

    info!(count = candidates.len(), "Parsed Washington listing");
    Ok(candidates)
}

pub struct Washington {
    descriptor: SourceDescriptor,
    extractor: Arc<RecordExtractor>,
}

impl Washington {
    pub fn new(extractor: Arc<RecordExtractor>) -> Self {
        Self {
            descriptor: SourceDescriptor::new("Washington", LISTING_URL, Capability::HtmlTable),
            extractor,
        }
    }
}

#[async_trait]
impl SourceAdapter for Washington {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    #[instrument(level = "info", skip_all, fields(source = "Washington"))]
    async fn enumerate(&self) -> Result<Vec<BreachCandidate>, SourceError> {
        let html = self.extractor.fetcher().text(LISTING_URL).await?;
        parse_listing(&html)
    }

    async fn extract(&self, candidate: &BreachCandidate) -> Option<BreachRecord> {
        let pdf_url = self.identity_url(candidate)?;
        self.extractor.extract_pdf(&pdf_url).await
    }
}
