//! The ledger of already-recorded breaches.
//!
//! Loaded once per run from the aggregate JSON file and consulted read-only.
//! Only the `url` field matters for deduplication: any object with a string
//! `url` is indexed, even when its other fields do not fit [`BreachRecord`].

use crate::models::BreachRecord;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Default, Clone)]
pub struct Ledger {
    records: Vec<BreachRecord>,
    urls: HashSet<String>,
}

impl Ledger {
    #[cfg(test)]
    pub fn new(records: Vec<BreachRecord>) -> Self {
        let urls = records
            .iter()
            .filter(|r| !r.url.is_empty())
            .map(|r| r.url.clone())
            .collect();
        Self { records, urls }
    }

    /// Load the ledger file.
    ///
    /// A missing file yields an empty ledger with a warning; an unreadable or
    /// malformed file yields an empty ledger with an error log. Neither stops
    /// the run.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            warn!("Ledger file not found; starting from an empty ledger");
            return Self::default();
        }
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                error!(error = %e, "Could not read ledger file");
                return Self::default();
            }
        };
        match Self::from_json(&raw) {
            Ok(ledger) => {
                info!(count = ledger.len(), "Loaded ledger");
                ledger
            }
            Err(e) => {
                error!(error = %e, "Could not parse ledger file");
                Self::default()
            }
        }
    }

    /// Parse a JSON array.
    ///
    /// Objects that do not deserialize as a record still contribute their
    /// `url`; other elements are skipped.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let values: Vec<Value> = serde_json::from_str(raw)?;
        let mut ledger = Self::default();
        for value in values.into_iter().filter(Value::is_object) {
            let url = value.get("url").and_then(Value::as_str).map(str::to_string);
            let record = match serde_json::from_value::<BreachRecord>(value) {
                Ok(record) => record,
                Err(e) => {
                    let Some(url) = url.clone() else { continue };
                    debug!(%url, error = %e, "Ledger entry is not record-shaped; indexing its url only");
                    BreachRecord {
                        url,
                        ..Default::default()
                    }
                }
            };
            if let Some(url) = url.filter(|u| !u.is_empty()) {
                ledger.urls.insert(url);
            }
            ledger.records.push(record);
        }
        Ok(ledger)
    }

    /// Whether a record with exactly this identity URL is already recorded.
    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    #[cfg(test)]
    pub fn insert(&mut self, record: BreachRecord) {
        if !record.url.is_empty() {
            self.urls.insert(record.url.clone());
        }
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[cfg(test)]
    pub fn records(&self) -> &[BreachRecord] {
        &self.records
    }
}
