//! Data models for breach candidates and records.
//!
//! - [`BreachCandidate`]: a lightweight reference produced while enumerating
//!   a source listing; consumed by the dedup check and then dropped
//! - [`BreachRecord`]: the durable, fully extracted disclosure
//! - [`SourceDescriptor`]: static description of a source adapter
//! - [`BreachMetadata`]: the JSON shape requested from the language model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Country code stamped on records from U.S. state sources.
pub const USA: &str = "USA";

/// Title stamped on records extracted from notification letters.
pub const NOTIFICATION_TITLE: &str = "Data Breach Notification";

/// A not-yet-verified reference to a possible new breach notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreachCandidate {
    /// Name of the source that produced this candidate.
    pub source_identifier: String,
    /// Organization name as listed by the source.
    pub organization_name: String,
    /// Date text as listed by the source (format varies per source).
    pub occurrence_date_text: String,
    /// Link to the notice or document, possibly relative to the listing URL.
    pub canonical_url: Option<String>,
}

/// A structured breach disclosure.
///
/// `url` is the identity key: it is unique within the ledger and is the only
/// field consulted for deduplication. Missing fields deserialize to empty
/// strings so older ledger entries still load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreachRecord {
    /// Date of the incident, `YYYY-MM-DD` when known.
    pub date: String,
    pub victim: String,
    /// Primary internet domain of the victim; empty when undiscovered.
    pub domain: String,
    /// ISO-3166 alpha-3 country code.
    pub country: String,
    pub summary: String,
    pub title: String,
    pub url: String,
    /// Date the record was created, `YYYY-MM-DD`.
    pub added: String,
    /// Document the record was extracted from, when `url` is a landing page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
}

/// How a source publishes its listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    HtmlTable,
    RssFeed,
    JsonApi,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::HtmlTable => "html-table",
            Capability::RssFeed => "rss-feed",
            Capability::JsonApi => "json-api",
        })
    }
}

/// Static description of a source adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    /// Human-readable jurisdiction name, e.g. `"New Hampshire"`.
    pub state_name: String,
    /// Listing page, feed, or API endpoint.
    pub listing_url: String,
    pub capability: Capability,
}

impl SourceDescriptor {
    pub fn new(state_name: &str, listing_url: impl Into<String>, capability: Capability) -> Self {
        Self {
            state_name: state_name.to_string(),
            listing_url: listing_url.into(),
            capability,
        }
    }

    /// Lowercase, underscore-joined name used in file names.
    ///
    /// `"New Hampshire"` -> `"new_hampshire"`
    pub fn slug(&self) -> String {
        self.state_name
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// The fields the model is asked to fill from a notification letter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BreachMetadata {
    pub victim: String,
    pub summary: String,
    pub date_discovered: String,
    pub domain: String,
}

impl BreachMetadata {
    /// Trim every field.
    pub fn trimmed(self) -> Self {
        Self {
            victim: self.victim.trim().to_string(),
            summary: self.summary.trim().to_string(),
            date_discovered: self.date_discovered.trim().to_string(),
            domain: self.domain.trim().to_string(),
        }
    }
}
