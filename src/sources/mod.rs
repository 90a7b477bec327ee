//! Breach-notification source adapters.
//!
//! Each submodule implements [`SourceAdapter`] for one state attorney
//! general's listing:
//!
//! - [`maine`]: HTML table, notice page with labeled fields, then PDF
//! - [`washington`]: HTML table linking straight to PDFs
//! - [`california`]: HTML table, notice page listing PDFs
//! - [`idaho`]: HTML table linking straight to PDFs
//! - [`iowa`]: yearly HTML table, several PDFs per row
//! - [`vermont`]: RSS feed, notice page, then PDF
//! - [`newhampshire`]: JSON document API linking to PDFs
//!
//! Every listing is filtered to yesterday's postings except Washington,
//! whose table carries no posting date. Adapters return candidates
//! newest-first, which the stop-at-first-seen pipeline relies on.

use crate::error::SourceError;
use crate::extract::RecordExtractor;
use crate::models::{BreachCandidate, BreachRecord, SourceDescriptor};
use crate::utils::resolve_url;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

pub mod california;
pub mod idaho;
pub mod iowa;
pub mod maine;
pub mod newhampshire;
mod table;
pub mod vermont;
pub mod washington;

/// One jurisdiction's listing and extraction rules.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn descriptor(&self) -> &SourceDescriptor;

    /// Fetch and parse the listing, newest first.
    ///
    /// A listing whose expected structure is missing is an error; a listing
    /// with nothing posted yesterday is an empty list.
    async fn enumerate(&self) -> Result<Vec<BreachCandidate>, SourceError>;

    /// Absolute identity URL of a candidate, used as the dedup key.
    fn identity_url(&self, candidate: &BreachCandidate) -> Option<String> {
        candidate
            .canonical_url
            .as_deref()
            .and_then(|href| resolve_url(&self.descriptor().listing_url, href))
    }

    /// Build the full record. `None` means filtered out or failed.
    async fn extract(&self, candidate: &BreachCandidate) -> Option<BreachRecord>;
}

/// Sources selectable on the command line, in processing order.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceName {
    Maine,
    Washington,
    California,
    Idaho,
    Iowa,
    Vermont,
    NewHampshire,
}

impl SourceName {
    pub const ALL: [SourceName; 7] = [
        SourceName::Maine,
        SourceName::Washington,
        SourceName::California,
        SourceName::Idaho,
        SourceName::Iowa,
        SourceName::Vermont,
        SourceName::NewHampshire,
    ];
}

/// Build the adapter for `name`. `yesterday` is the posting date listings
/// are filtered on.
pub fn build_adapter(
    name: SourceName,
    extractor: Arc<RecordExtractor>,
    yesterday: NaiveDate,
) -> Box<dyn SourceAdapter> {
    match name {
        SourceName::Maine => Box::new(maine::Maine::new(extractor, yesterday)),
        SourceName::Washington => Box::new(washington::Washington::new(extractor)),
        SourceName::California => Box::new(california::California::new(extractor, yesterday)),
        SourceName::Idaho => Box::new(idaho::Idaho::new(extractor, yesterday)),
        SourceName::Iowa => Box::new(iowa::Iowa::new(extractor, yesterday)),
        SourceName::Vermont => Box::new(vermont::Vermont::new(extractor, yesterday)),
        SourceName::NewHampshire => Box::new(newhampshire::NewHampshire::new(extractor, yesterday)),
    }
}
