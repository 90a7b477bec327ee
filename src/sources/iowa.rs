//! Iowa Attorney General security breach notifications.
//!
//! The listing moves to a new page every year. Rows are `date |
//! organization links`; a row may carry the original letter plus
//! supplemental letters, and every non-supplemental link is its own
//! candidate.

use super::table::find_rows;
use super::SourceAdapter;
use crate::error::SourceError;
use crate::extract::RecordExtractor;
use crate::models::{BreachCandidate, BreachRecord, Capability, SourceDescriptor};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use scraper::Selector;
use std::sync::Arc;
use tracing::{debug, info, instrument};

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("static table selector"));

/// Listing page for `year`.
pub fn listing_url(year: i32) -> String {
    format!(
        "https://www.iowaattorneygeneral.gov/for-consumers/security-breach-notifications/{year}-security-breach-notification"
    )
}

/// Letters from rows dated `yesterday` (`M-D-YYYY`, no leading zeros).
pub fn parse_listing(html: &str, yesterday: NaiveDate) -> Result<Vec<BreachCandidate>, SourceError> {
    let rows = find_rows(html, &TABLE, false)
        .ok_or_else(|| SourceError::structure("Iowa", "no table found"))?;
    let wanted = yesterday.format("%-m-%-d-%Y").to_string();

    let candidates: Vec<BreachCandidate> = rows
        .iter()
        .filter(|cells| cells.len() >= 2 && cells[0].text == wanted)
        .flat_map(|cells| {
            cells[1]
                .links
                .iter()
                .filter(|link| !link.href.is_empty())
                .filter(|link| {
                    let supplemental = link.text.to_lowercase().contains("supplemental");
                    if supplemental {
                        debug!(letter = %link.text, "Skipping supplemental letter");
                    }
                    !supplemental
                })
                .map(move |link| BreachCandidate {
                    source_identifier: "Iowa".to_string(),
                    organization_name: link.text.clone(),
                    occurrence_date_text: cells[0].text.clone(),
                    canonical_url: Some(link.href.clone()),
                })
        })
        .collect();

    info!(count = candidates.len(), date = %wanted, "Parsed Iowa listing");
    Ok(candidates)
}

pub struct Iowa {
    descriptor: SourceDescriptor,
    extractor: Arc<RecordExtractor>,
    yesterday: NaiveDate,
}

impl Iowa {
    /// Uses the listing of the year `yesterday` falls in, so the run on
    /// January 1st still reads December 31st.
    pub fn new(extractor: Arc<RecordExtractor>, yesterday: NaiveDate) -> Self {
        Self {
            descriptor: SourceDescriptor::new(
                "Iowa",
                listing_url(yesterday.year()),
                Capability::HtmlTable,
            ),
            extractor,
            yesterday,
        }
    }
}

#[async_trait]
impl SourceAdapter for Iowa {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    #[instrument(level = "info", skip_all, fields(source = "Iowa"))]
    async fn enumerate(&self) -> Result<Vec<BreachCandidate>, SourceError> {
        let html = self.extractor.fetcher().text(&self.descriptor.listing_url).await?;
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
    use crate::sources::testing::{date, extract_keyed, extractor, reading_extractor, NOTICE_PDF};

    const LISTING: &str = r#"
        <table>
          <thead><tr><th>Date Reported</th><th>Organization</th></tr></thead>
          <tbody>
            <tr><td>6-5-2025</td><td>
              <a href="/media/cms/Lima_Bank.pdf">Lima Bank</a>
              <a href="/media/cms/Lima_Bank_Supp.pdf">Lima Bank Supplemental</a>
              <a href="/media/cms/Mike_Co.pdf">Mike Co</a>
            </td></tr>
            <tr><td>6-4-2025</td><td><a href="/media/cms/November.pdf">November LLC</a></td></tr>
          </tbody>
        </table>"#;

    #[test]
    fn test_parse_listing_splits_links_and_skips_supplemental() {
        let candidates = parse_listing(LISTING, date("2025-06-05")).unwrap();
        let names: Vec<&str> = candidates.iter().map(|c| c.organization_name.as_str()).collect();
        assert_eq!(names, ["Lima Bank", "Mike Co"]);
    }

    #[test]
    fn test_listing_url_follows_yesterdays_year() {
        let adapter = Iowa::new(extractor(FakeFetch::new()), date("2024-12-31"));
        assert!(adapter.descriptor().listing_url.contains("/2024-security-breach-notification"));
    }

    #[test]
    fn test_identity_is_absolute() {
        let adapter = Iowa::new(extractor(FakeFetch::new()), date("2025-06-05"));
        let c = parse_listing(LISTING, date("2025-06-05")).unwrap().remove(0);
        assert_eq!(
            adapter.identity_url(&c).as_deref(),
            Some("https://www.iowaattorneygeneral.gov/media/cms/Lima_Bank.pdf")
        );
    }

    #[tokio::test]
    async fn test_record_is_keyed_by_letter() {
        let pdf_url = "https://www.iowaattorneygeneral.gov/media/cms/Mike_Co.pdf";
        let fetch = FakeFetch::new().with_page(pdf_url, NOTICE_PDF);
        let adapter = Iowa::new(reading_extractor(fetch), date("2025-06-05"));
        let candidate = parse_listing(LISTING, date("2025-06-05")).unwrap().remove(1);

        let record = extract_keyed(&adapter, &candidate).await;
        assert_eq!(record.url, pdf_url);
        assert_eq!(record.victim, "Acme Dental");
    }
}
