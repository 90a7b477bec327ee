//! New Hampshire Department of Justice security breach documents.
//!
//! The site front-end reads a JSON document API; the adapter calls it with
//! the same XHR headers a browser would. Each document carries its title,
//! posting date and the uploaded letter.

use super::SourceAdapter;
use crate::error::SourceError;
use crate::extract::RecordExtractor;
use crate::models::{BreachCandidate, BreachRecord, Capability, SourceDescriptor};
use crate::utils::resolve_url;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub const API_URL: &str = "https://www.doj.nh.gov/content/api/documents?q=%40field_document_category%7C%3D%7C2146%40field_document_purpose%7CCONTAINS%7C5996&textsearch=&sort=field_date_posted%7Cdesc%7CALLOW_NULLS&iterate_nodes=true&filter_mode=INCLUSIVE&type=document&page=1&size=25";
const SITE_ROOT: &str = "https://www.doj.nh.gov";

const XHR_HEADERS: [(&str, &str); 6] = [
    ("Accept", "application/json, text/plain, */*"),
    ("Referer", "https://www.doj.nh.gov/consumer/security-breaches"),
    ("X-Requested-With", "XMLHttpRequest"),
    ("Sec-Fetch-Dest", "empty"),
    ("Sec-Fetch-Mode", "cors"),
    ("Sec-Fetch-Site", "same-origin"),
];

const DATE_POSTED: &str = "/fields/field_date_posted/0";
/// `field_document_file` is keyed `"0"`; a pointer segment matches both an
/// object key and an array index.
const DOCUMENT_URI: &str = "/fields/field_document_file/0/fields/uri/0";

/// Documents posted on `yesterday`.
pub fn parse_documents(body: &str, yesterday: NaiveDate) -> Result<Vec<BreachCandidate>, SourceError> {
    let root: Value = serde_json::from_str(body)
        .map_err(|e| SourceError::structure("New Hampshire", format!("invalid JSON: {e}")))?;
    let documents = root
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::structure("New Hampshire", "response has no `data` list"))?;

    let candidates: Vec<BreachCandidate> = documents
        .iter()
        .filter_map(|doc| {
            let title = doc.get("title").and_then(Value::as_str).map(str::trim)?;
            if title.is_empty() {
                return None;
            }
            let posted = doc
                .pointer(DATE_POSTED)
                .and_then(Value::as_str)
                .and_then(|s| s.get(..10))
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())?;
            if posted != yesterday {
                return None;
            }
            let uri = doc.pointer(DOCUMENT_URI).and_then(Value::as_str)?;
            let Some(pdf_url) = resolve_url(SITE_ROOT, uri) else {
                debug!(%title, "Document without a usable file URI");
                return None;
            };
            Some(BreachCandidate {
                source_identifier: "New Hampshire".to_string(),
                organization_name: title.to_string(),
                occurrence_date_text: posted.format("%Y-%m-%d").to_string(),
                canonical_url: Some(pdf_url),
            })
        })
        .collect();

    info!(count = candidates.len(), "Parsed New Hampshire documents");
    Ok(candidates)
}

pub struct NewHampshire {
    descriptor: SourceDescriptor,
    extractor: Arc<RecordExtractor>,
    yesterday: NaiveDate,
}

impl NewHampshire {
    pub fn new(extractor: Arc<RecordExtractor>, yesterday: NaiveDate) -> Self {
        Self {
            descriptor: SourceDescriptor::new("New Hampshire", API_URL, Capability::JsonApi),
            extractor,
            yesterday,
        }
    }
}

#[async_trait]
impl SourceAdapter for NewHampshire {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    #[instrument(level = "info", skip_all, fields(source = "New Hampshire"))]
    async fn enumerate(&self) -> Result<Vec<BreachCandidate>, SourceError> {
        let body = self
            .extractor
            .fetcher()
            .text_with_headers(API_URL, &XHR_HEADERS)
            .await?;
        parse_documents(&body, self.yesterday)
    }

    async fn extract(&self, candidate: &BreachCandidate) -> Option<BreachRecord> {
        let pdf_url = self.identity_url(candidate)?;
        let mut record = self.extractor.extract_pdf(&pdf_url).await?;
        record.victim = candidate.organization_name.clone();
        record.date = candidate.occurrence_date_text.clone();
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::fake::FakeFetch;
    use crate::sources::testing::{date, extract_keyed, reading_extractor, NOTICE_PDF};
    use serde_json::json;

    fn document(title: &str, posted: &str, uri: &str) -> Value {
        json!({
            "title": title,
            "fields": {
                "field_date_posted": [posted],
                "field_document_file": {
                    "0": { "fields": { "uri": [uri] } }
                }
            }
        })
    }

    #[test]
    fn test_parse_documents() {
        let body = json!({
            "data": [
                document("Sierra Health", "2025-06-18T14:05:00Z", "/sites/g/files/sierra.pdf"),
                document("Tango Corp", "2025-06-17", "/sites/g/files/tango.pdf"),
                document("  ", "2025-06-18", "/sites/g/files/blank.pdf"),
                json!({ "title": "Uniform", "fields": {} }),
            ]
        })
        .to_string();
        let candidates = parse_documents(&body, date("2025-06-18")).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].organization_name, "Sierra Health");
        assert_eq!(candidates[0].occurrence_date_text, "2025-06-18");
        assert_eq!(
            candidates[0].canonical_url.as_deref(),
            Some("https://www.doj.nh.gov/sites/g/files/sierra.pdf")
        );
    }

    #[test]
    fn test_file_list_as_array() {
        let body = json!({
            "data": [{
                "title": "Victor",
                "fields": {
                    "field_date_posted": ["2025-06-18"],
                    "field_document_file": [{ "fields": { "uri": ["https://files.nh.gov/v.pdf"] } }]
                }
            }]
        })
        .to_string();
        let candidates = parse_documents(&body, date("2025-06-18")).unwrap();
        assert_eq!(candidates[0].canonical_url.as_deref(), Some("https://files.nh.gov/v.pdf"));
    }

    #[test]
    fn test_structural_failures() {
        assert!(matches!(
            parse_documents(r#"{"items": []}"#, date("2025-06-18")),
            Err(SourceError::Structure { .. })
        ));
        assert!(matches!(
            parse_documents("<html>", date("2025-06-18")),
            Err(SourceError::Structure { .. })
        ));
        assert!(parse_documents(r#"{"data": []}"#, date("2025-06-18")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_takes_title_and_posting_date() {
        let y = date("2025-06-18");
        let pdf_url = "https://www.doj.nh.gov/sites/g/files/sierra.pdf";
        let body = json!({ "data": [document("Sierra Health", "2025-06-18T14:05:00Z", "/sites/g/files/sierra.pdf")] })
            .to_string();
        let fetch = FakeFetch::new().with_page(pdf_url, NOTICE_PDF);
        let adapter = NewHampshire::new(reading_extractor(fetch), y);
        let candidate = parse_documents(&body, y).unwrap().remove(0);

        let record = extract_keyed(&adapter, &candidate).await;
        assert_eq!(record.url, pdf_url);
        assert_eq!(record.victim, "Sierra Health");
        assert_eq!(record.date, "2025-06-18");
        assert_eq!(record.domain, "acmedental.com");
        assert_eq!(record.pdf_url, None);
    }
}
