//! Idaho Attorney General security breach notices.
//!
//! A single table of `organization | date` rows where the organization links
//! straight to the notification letter.

use super::table::find_rows;
use super::SourceAdapter;
use crate::error::SourceError;
use crate::extract::RecordExtractor;
use crate::models::{BreachCandidate, BreachRecord, Capability, SourceDescriptor};
use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::Selector;
use std::sync::Arc;
use tracing::{info, instrument};

pub const LISTING_URL: &str = "https://www.ag.idaho.gov/consumer-protection/security-breaches/";

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("static table selector"));

/// Linked rows dated `yesterday` (`M/DD/YYYY`, no leading zero on the month).
pub fn parse_listing(html: &str, yesterday: NaiveDate) -> Result<Vec<BreachCandidate>, SourceError> {
    let rows = find_rows(html, &TABLE, false)
        .ok_or_else(|| SourceError::structure("Idaho", "no table found"))?;
    let wanted = yesterday.format("%-m/%d/%Y").to_string();

    let candidates: Vec<BreachCandidate> = rows
        .iter()
        .filter(|cells| cells.len() >= 2 && cells[1].text == wanted)
        .filter_map(|cells| match cells[0].name_and_href() {
            (name, Some(href)) if !name.is_empty() => Some(BreachCandidate {
                source_identifier: "Idaho".to_string(),
                organization_name: name,
                occurrence_date_text: cells[1].text.clone(),
                canonical_url: Some(href),
            }),
            _ => None,
        })
        .collect();

    info!(count = candidates.len(), date = %wanted, "Parsed Idaho listing");
    Ok(candidates)
}

pub struct Idaho {
    descriptor: SourceDescriptor,
    extractor: Arc<RecordExtractor>,
    yesterday: NaiveDate,
}

impl Idaho {
    pub fn new(extractor: Arc<RecordExtractor>, yesterday: NaiveDate) -> Self {
        Self {
            descriptor: SourceDescriptor::new("Idaho", LISTING_URL, Capability::HtmlTable),
            extractor,
            yesterday,
        }
    }
}

#[async_trait]
impl SourceAdapter for Idaho {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    #[instrument(level = "info", skip_all, fields(source = "Idaho"))]
    async fn enumerate(&self) -> Result<Vec<BreachCandidate>, SourceError> {
        let html = self.extractor.fetcher().text(LISTING_URL).await?;
        parse_listing(&html, self.yesterday)
    }

    async fn extract(&self, candidate: &BreachCandidate) -> Option<BreachRecord> {
        let pdf_url = self.identity_url(candidate)?;
        self.extractor.extract_pdf(&pdf_url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::fake::FakeFetch;
    use crate::sources::testing::{date, extract_keyed, reading_extractor, NOTICE_PDF};

    const LISTING: &str = r#"
        <table>
          <tr><th>Organization</th><th>Date</th></tr>
          <tr><td><a href="https://www.ag.idaho.gov/content/uploads/2025/06/India.pdf">India Credit Union</a></td><td>6/05/2025</td></tr>
          <tr><td>Juliet Farms</td><td>6/05/2025</td></tr>
          <tr><td><a href="/content/uploads/2025/06/Kilo.pdf">Kilo Corp</a></td><td>6/04/2025</td></tr>
        </table>"#;

    #[test]
    fn test_parse_listing_unpadded_month() {
        let candidates = parse_listing(LISTING, date("2025-06-05")).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].organization_name, "India Credit Union");
        assert_eq!(candidates[0].occurrence_date_text, "6/05/2025");
    }

    #[test]
    fn test_missing_table_is_structural() {
        assert!(parse_listing("<p>moved</p>", date("2025-06-05")).is_err());
    }

    #[tokio::test]
    async fn test_record_is_keyed_by_letter() {
        let pdf_url = "https://www.ag.idaho.gov/content/uploads/2025/06/India.pdf";
        let fetch = FakeFetch::new().with_page(pdf_url, NOTICE_PDF);
        let adapter = Idaho::new(reading_extractor(fetch), date("2025-06-05"));
        let candidate = parse_listing(LISTING, date("2025-06-05")).unwrap().remove(0);

        let record = extract_keyed(&adapter, &candidate).await;
        assert_eq!(record.url, pdf_url);
        assert_eq!(record.victim, "Acme Dental");
    }
}
