//! Maine Attorney General breach notices.
//!
//! The listing is an HTML table of `date | organization` rows. Each
//! organization links to a notice page of labeled `<li>` fields; the
//! notification letter is linked from that page. Only notices attributed to
//! an external hacking incident are recorded.

use super::table::{element_text, find_rows};
use super::SourceAdapter;
use crate::error::SourceError;
use crate::extract::RecordExtractor;
use crate::models::{BreachCandidate, BreachRecord, Capability, SourceDescriptor};
use crate::utils::{parse_loose_date, resolve_url};
use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

pub const LISTING_URL: &str =
    "https://www.maine.gov/agviewer/content/ag/985235c7-cb95-4be2-8792-a1252b4f8318/list.html";
const SITE_ROOT: &str = "https://www.maine.gov";

/// The only breach type that is recorded.
pub const HACKING: &str = "External system breach (hacking)";

static TABLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table.breachTable").expect("static table selector"));
static ITEM: Lazy<Selector> = Lazy::new(|| Selector::parse("li").expect("static li selector"));
static STRONG: Lazy<Selector> =
    Lazy::new(|| Selector::parse("strong").expect("static strong selector"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("static a selector"));

/// Candidates posted on `yesterday`. Column 0 is the posting date
/// (`YYYY-MM-DD`), column 1 the organization and notice link.
pub fn parse_listing(html: &str, yesterday: NaiveDate) -> Result<Vec<BreachCandidate>, SourceError> {
    let rows = find_rows(html, &TABLE, true)
        .ok_or_else(|| SourceError::structure("Maine", "no table rows found"))?;
    let wanted = yesterday.format("%Y-%m-%d").to_string();

    let candidates: Vec<BreachCandidate> = rows
        .iter()
        .filter(|cells| cells.len() >= 2)
        .filter(|cells| {
            let keep = cells[0].text == wanted;
            if !keep {
                debug!(date = %cells[0].text, "Skipping notice not posted yesterday");
            }
            keep
        })
        .filter_map(|cells| {
            let (name, href) = cells[1].name_and_href();
            (!name.is_empty()).then(|| BreachCandidate {
                source_identifier: "Maine".to_string(),
                organization_name: name,
                occurrence_date_text: cells[0].text.clone(),
                canonical_url: href,
            })
        })
        .collect();

    info!(count = candidates.len(), date = %wanted, "Parsed Maine listing");
    Ok(candidates)
}

/// The labeled fields of a notice page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub victim: String,
    /// Breach date(s) as printed.
    pub date: String,
    /// Link to the letter sent to residents, possibly relative.
    pub letter_href: String,
    pub description: String,
}

/// Read the notice page. Every field is required.
pub fn parse_notice(html: &str) -> Option<Notice> {
    let document = Html::parse_document(html);
    let mut victim = None;
    let mut date = None;
    let mut letter_href = None;
    let mut description = None;

    for li in document.select(&ITEM) {
        let text = element_text(li);
        let strong = || li.select(&STRONG).next().map(element_text);
        if text.contains("Entity Name:") {
            victim = strong();
        } else if text.contains("Date(s) Breach Occured:") {
            date = strong();
        } else if text.contains("Copy of notice to affected Maine residents") {
            letter_href = li
                .select(&ANCHOR)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(str::to_string);
        } else if text.contains("Description of the Breach:") {
            description = strong();
        }
    }

    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    Some(Notice {
        victim: non_empty(victim)?,
        date: non_empty(date)?,
        letter_href: non_empty(letter_href)?,
        description: non_empty(description)?,
    })
}

pub struct Maine {
    descriptor: SourceDescriptor,
    extractor: Arc<RecordExtractor>,
    yesterday: NaiveDate,
}

impl Maine {
    pub fn new(extractor: Arc<RecordExtractor>, yesterday: NaiveDate) -> Self {
        Self {
            descriptor: SourceDescriptor::new("Maine", LISTING_URL, Capability::HtmlTable),
            extractor,
            yesterday,
        }
    }
}

#[async_trait]
impl SourceAdapter for Maine {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    #[instrument(level = "info", skip_all, fields(source = "Maine"))]
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

        let Some(notice) = parse_notice(&html) else {
            warn!(url = %notice_url, "Missing required details on notice page");
            return None;
        };
        if notice.description != HACKING {
            info!(description = %notice.description, "Skipping notice that is not an external hacking breach");
            return None;
        }

        let pdf_url = resolve_url(SITE_ROOT, &notice.letter_href)?;
        let mut record = self.extractor.extract_pdf(&pdf_url).await?;
        record.victim = notice.victim;
        record.date = parse_loose_date(&notice.date).unwrap_or(notice.date);
        record.url = notice_url;
        record.pdf_url = Some(pdf_url);
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::fake::FakeFetch;
    use crate::ledger::Ledger;
    use crate::notify::fake::RecordingNotifier;
    use crate::outputs::json::fake::MemorySink;
    use crate::pipeline::{Pipeline, StopPolicy};
    use crate::sources::testing::{date, extract_keyed, extractor, reading_extractor, NOTICE_PDF};

    const LISTING: &str = r#"
        <table class="breachTable stripe hover dataTable no-footer">
          <thead><tr><th>Date Reported</th><th>Organization Name</th></tr></thead>
          <tbody>
            <tr><td>2025-06-18</td><td><a href="viewer.html?id=3">Gamma LLC</a></td></tr>
            <tr><td>2025-06-18</td><td><a href="viewer.html?id=2">Beta Inc</a></td></tr>
            <tr><td>2025-06-17</td><td><a href="viewer.html?id=1">Alpha Co</a></td></tr>
          </tbody>
        </table>"#;

    fn notice(description: &str) -> String {
        format!(
            r#"<ul>
              <li>Entity Name: <strong>Gamma LLC</strong></li>
              <li>Date(s) Breach Occured: <strong>May 30, 2025</strong></li>
              <li>Description of the Breach: <strong>{description}</strong></li>
              <li>Copy of notice to affected Maine residents: <a href="/agviewer/content/ag/docs/gamma.pdf">gamma.pdf</a></li>
            </ul>"#
        )
    }

    #[test]
    fn test_parse_listing_filters_yesterday() {
        let candidates = parse_listing(LISTING, date("2025-06-18")).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].organization_name, "Gamma LLC");
        assert_eq!(candidates[0].canonical_url.as_deref(), Some("viewer.html?id=3"));
        assert_eq!(candidates[1].occurrence_date_text, "2025-06-18");
    }

    #[test]
    fn test_parse_listing_nothing_yesterday_is_empty() {
        assert!(parse_listing(LISTING, date("2025-07-01")).unwrap().is_empty());
    }

    #[test]
    fn test_parse_listing_without_rows_is_structural() {
        assert!(matches!(
            parse_listing("<html><body>Down for maintenance</body></html>", date("2025-06-18")),
            Err(SourceError::Structure { .. })
        ));
    }

    #[test]
    fn test_parse_notice() {
        let n = parse_notice(&notice(HACKING)).unwrap();
        assert_eq!(n.victim, "Gamma LLC");
        assert_eq!(n.date, "May 30, 2025");
        assert_eq!(n.description, HACKING);
        assert_eq!(n.letter_href, "/agviewer/content/ag/docs/gamma.pdf");
    }

    #[test]
    fn test_parse_notice_requires_every_field() {
        let partial = r#"<ul><li>Entity Name: <strong>Gamma LLC</strong></li></ul>"#;
        assert!(parse_notice(partial).is_none());
    }

    #[tokio::test]
    async fn test_non_hacking_notice_is_filtered() {
        let notice_url = "https://www.maine.gov/agviewer/content/ag/985235c7-cb95-4be2-8792-a1252b4f8318/viewer.html?id=3";
        let fetch = FakeFetch::new().with_page(notice_url, notice("Other"));
        let ex = extractor(fetch);
        let adapter = Maine::new(ex, date("2025-06-18"));
        let candidate = parse_listing(LISTING, date("2025-06-18")).unwrap().remove(0);
        assert!(adapter.extract(&candidate).await.is_none());
    }

    #[tokio::test]
    async fn test_hacking_notice_fetches_letter_from_site_root() {
        let notice_url = "https://www.maine.gov/agviewer/content/ag/985235c7-cb95-4be2-8792-a1252b4f8318/viewer.html?id=3";
        let fetch = Arc::new(FakeFetch::new().with_page(notice_url, notice(HACKING)));
        let ex = Arc::new(RecordExtractor::new(
            fetch.clone(),
            None,
            crate::discovery::DomainDiscovery::new(Arc::new(
                crate::discovery::fake::StaticResolver::new(&[]),
            )),
        ));
        let adapter = Maine::new(ex, date("2025-06-18"));
        let candidate = parse_listing(LISTING, date("2025-06-18")).unwrap().remove(0);
        // The letter itself is not served, so extraction fails after the request.
        assert!(adapter.extract(&candidate).await.is_none());
        assert_eq!(
            fetch.requests(),
            vec![
                notice_url.to_string(),
                "https://www.maine.gov/agviewer/content/ag/docs/gamma.pdf".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_hacking_notice_record_points_at_notice_page() {
        let notice_url = "https://www.maine.gov/agviewer/content/ag/985235c7-cb95-4be2-8792-a1252b4f8318/viewer.html?id=3";
        let letter_url = "https://www.maine.gov/agviewer/content/ag/docs/gamma.pdf";
        let fetch = FakeFetch::new()
            .with_page(notice_url, notice(HACKING))
            .with_page(letter_url, NOTICE_PDF);
        let adapter = Maine::new(reading_extractor(fetch), date("2025-06-18"));
        let candidate = parse_listing(LISTING, date("2025-06-18")).unwrap().remove(0);

        let record = extract_keyed(&adapter, &candidate).await;
        assert_eq!(record.url, notice_url);
        assert_eq!(record.pdf_url.as_deref(), Some(letter_url));
        assert_eq!(record.victim, "Gamma LLC");
        assert_eq!(record.date, "2025-05-30");
        assert_eq!(record.domain, "acmedental.com");
        assert_eq!(record.summary, "Ransomware encrypted patient files.");
    }

    #[tokio::test]
    async fn test_run_with_only_other_notices_succeeds_empty() {
        let viewer = "https://www.maine.gov/agviewer/content/ag/985235c7-cb95-4be2-8792-a1252b4f8318/viewer.html";
        let fetch = FakeFetch::new()
            .with_page(LISTING_URL, LISTING)
            .with_page(&format!("{viewer}?id=3"), notice("Other"))
            .with_page(&format!("{viewer}?id=2"), notice("Other"));
        let adapter = Maine::new(extractor(fetch), date("2025-06-18"));
        let ledger = Ledger::default();
        let sink = MemorySink::new();
        let notifier = RecordingNotifier::new();

        let report = Pipeline::new(&ledger, &sink, &notifier, StopPolicy::FirstSeen)
            .run_source(&adapter)
            .await
            .unwrap();
        assert_eq!(report.examined, 2);
        assert!(report.persisted.is_empty());
        assert!(sink.saved().is_empty());
        assert!(notifier.calls().is_empty());
    }
}
