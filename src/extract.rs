//! Record extraction from breach notification letters.
//!
//! A notification letter (almost always a PDF) is turned into a
//! [`BreachRecord`] in four steps:
//!
//! 1. download the document through [`Fetch`]
//! 2. pull the text out with `pdf-extract` on a blocking thread
//! 3. ask the language model for [`BreachMetadata`] as a JSON object
//! 4. fill a missing domain through the [`DomainDiscovery`] chain
//!
//! Model failures and schema mismatches degrade to empty fields; only an
//! unreachable or unreadable document makes the whole extraction fail.

use crate::api::{ChatRequest, LanguageModel};
use crate::discovery::DomainDiscovery;
use crate::fetch::Fetch;
use crate::models::{BreachMetadata, BreachRecord, NOTIFICATION_TITLE, USA};
use crate::utils::{looks_truncated, truncate_for_log};
use chrono::Local;
use itertools::Itertools;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Size of the windows the cleaned text is cut into before re-joining.
const CHUNK_SIZE: usize = 500;

const METADATA_SYSTEM_PROMPT: &str = r#"You are a data breach analysis expert. When asked to analyze breach notifications,
always respond with valid JSON objects that match this structure:
{
  "victim": "string",
  "summary": "string",
  "date_discovered": "string",
  "domain": "string"
}
Your response should ONLY contain the JSON object and nothing else."#;

fn metadata_user_prompt(text: &str) -> String {
    format!(
        "Analyze this data breach notification text and extract the following information:\n\n\
         Text to analyze:\n{text}\n\n\
         Extract:\n\
         - victim: Name of the organization/entity that suffered the breach\n\
         - summary: Summary of the breach in maximum 3 sentences\n\
         - date_discovered: Date when the incident was discovered (format: YYYY-MM-DD)\n\
         - domain: Primary internet domain name of the organization (e.g., company.com, leave empty if unknown)"
    )
}

/// Drop image placeholder tokens and normalize whitespace.
///
/// Tokens starting with `Image` or `IMAGE` are removed, the rest is
/// re-joined with single spaces, cut into [`CHUNK_SIZE`]-character windows
/// and the windows joined with a space.
pub fn clean_pdf_text(raw: &str) -> String {
    let words = raw
        .split_whitespace()
        .filter(|w| !w.starts_with("Image") && !w.starts_with("IMAGE"))
        .join(" ");
    words
        .chars()
        .chunks(CHUNK_SIZE)
        .into_iter()
        .map(|chunk| chunk.collect::<String>())
        .join(" ")
}

/// Parse the model's answer into metadata.
///
/// Accepts a bare JSON object or one wrapped in prose or code fences.
pub fn parse_metadata(answer: &str) -> Result<BreachMetadata, serde_json::Error> {
    match serde_json::from_str::<BreachMetadata>(answer.trim()) {
        Ok(meta) => Ok(meta.trimmed()),
        Err(e) => {
            let embedded = answer
                .find('{')
                .zip(answer.rfind('}'))
                .filter(|(start, end)| start < end)
                .map(|(start, end)| &answer[start..=end]);
            match embedded {
                Some(obj) if obj.len() < answer.trim().len() => {
                    serde_json::from_str::<BreachMetadata>(obj).map(BreachMetadata::trimmed)
                }
                _ => Err(e),
            }
        }
    }
}

/// Turns notification documents into [`BreachRecord`]s.
pub struct RecordExtractor {
    fetch: Arc<dyn Fetch>,
    model: Option<Arc<dyn LanguageModel>>,
    discovery: DomainDiscovery,
}

impl RecordExtractor {
    pub fn new(
        fetch: Arc<dyn Fetch>,
        model: Option<Arc<dyn LanguageModel>>,
        discovery: DomainDiscovery,
    ) -> Self {
        Self {
            fetch,
            model,
            discovery,
        }
    }

    /// The fetcher used for documents, shared with adapters that need to
    /// read a landing page before the document.
    pub fn fetcher(&self) -> &dyn Fetch {
        self.fetch.as_ref()
    }

    /// Download and extract the PDF at `pdf_url`.
    ///
    /// The record's `url` is `pdf_url`; callers override it when the
    /// identity is a landing page.
    #[instrument(level = "info", skip(self))]
    pub async fn extract_pdf(&self, pdf_url: &str) -> Option<BreachRecord> {
        let bytes = match self.fetch.bytes(pdf_url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "Failed to download PDF");
                return None;
            }
        };
        let text = pdf_text(bytes).await?;
        Some(self.record_from_text(pdf_url, &text).await)
    }

    /// Build a record from already extracted document text.
    pub async fn record_from_text(&self, url: &str, raw_text: &str) -> BreachRecord {
        let text = clean_pdf_text(raw_text);
        let mut meta = self.read_metadata(&text).await;

        if meta.domain.is_empty() && !meta.victim.is_empty() {
            meta.domain = self
                .discovery
                .discover(&meta.victim, self.model.as_deref())
                .await;
        }

        let record = BreachRecord {
            date: meta.date_discovered,
            victim: meta.victim,
            domain: meta.domain,
            country: USA.to_string(),
            summary: meta.summary,
            title: NOTIFICATION_TITLE.to_string(),
            url: url.to_string(),
            added: Local::now().date_naive().format("%Y-%m-%d").to_string(),
            pdf_url: None,
        };
        info!(victim = %record.victim, domain = %record.domain, "Extracted record");
        record
    }

    /// Ask the model for metadata; any failure yields empty fields.
    async fn read_metadata(&self, text: &str) -> BreachMetadata {
        let Some(model) = &self.model else {
            warn!("No language model configured; metadata left empty");
            return BreachMetadata::default();
        };

        let request = ChatRequest::new(METADATA_SYSTEM_PROMPT, metadata_user_prompt(text))
            .temperature(0.1)
            .max_tokens(400)
            .json();

        let answer = match model.complete(&request).await {
            Ok(answer) => answer,
            Err(e) => {
                error!(error = %e, "Metadata request failed");
                return BreachMetadata::default();
            }
        };

        let parsed = match parse_metadata(&answer) {
            // If the parse failed due to EOF (truncation), re-ask ONCE
            Err(e) if looks_truncated(&e) => {
                warn!(error = %e, "EOF while parsing metadata; re-asking once");
                match model.complete(&request).await {
                    Ok(second) => parse_metadata(&second),
                    Err(e2) => {
                        warn!(error = %e2, "Re-ask failed");
                        Err(e)
                    }
                }
            }
            other => other,
        };

        match parsed {
            Ok(meta) => meta,
            Err(e) => {
                warn!(
                    error = %e,
                    response_preview = %truncate_for_log(&answer, 300),
                    "Model returned non-conforming JSON; using empty metadata"
                );
                BreachMetadata::default()
            }
        }
    }
}

/// Extract the text of every page. Runs on the blocking pool; a parser
/// panic is reported like any other unreadable document.
async fn pdf_text(bytes: Vec<u8>) -> Option<String> {
    let len = bytes.len();
    match tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes)).await {
        Ok(Ok(text)) => {
            debug!(bytes = len, chars = text.len(), "Extracted PDF text");
            Some(text)
        }
        Ok(Err(e)) => {
            error!(error = %e, "Unreadable PDF");
            None
        }
        Err(e) => {
            error!(error = %e, "PDF parser aborted");
            None
        }
    }
}
