//! The per-source ingestion pipeline.
//!
//! For one [`SourceAdapter`] a run goes
//! enumerate → identity → ledger check → extract → persist, then one
//! notification summarizing what was persisted:
//!
//! - Candidates are examined in listing order (newest first).
//! - Under [`StopPolicy::FirstSeen`] the first candidate already in the
//!   ledger ends the enumeration: everything after it is older and assumed
//!   known. [`StopPolicy::ScanDepth`] instead examines a bounded number of
//!   candidates and skips known ones, for listings whose order is not
//!   trusted.
//! - A URL listed more than once is handled at its first occurrence only.
//! - Each extracted record is persisted immediately, so earlier records
//!   survive a failure later in the run.
//! - Extraction, persistence and notification failures are logged and never
//!   fail the source. Only enumeration errors do.

use crate::error::SourceError;
use crate::ledger::Ledger;
use crate::models::BreachRecord;
use crate::notify::Notifier;
use crate::outputs::json::RecordSink;
use crate::sources::SourceAdapter;
use std::collections::HashSet;
use tracing::{debug, error, info, instrument, warn};

/// When to stop walking a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopPolicy {
    /// Stop at the first candidate already in the ledger.
    #[default]
    FirstSeen,
    /// Examine at most this many candidates, skipping known ones.
    ScanDepth(usize),
}

impl StopPolicy {
    pub fn from_scan_depth(scan_depth: Option<usize>) -> Self {
        scan_depth.map_or(StopPolicy::FirstSeen, StopPolicy::ScanDepth)
    }
}

/// Outcome of a successful source run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceReport {
    pub candidates: usize,
    pub examined: usize,
    pub persisted: Vec<BreachRecord>,
    /// Whether enumeration ended at a known candidate.
    pub stopped_at_seen: bool,
}

/// Totals over a multi-source run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub records: usize,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

pub struct Pipeline<'a> {
    ledger: &'a Ledger,
    sink: &'a dyn RecordSink,
    notifier: &'a dyn Notifier,
    stop: StopPolicy,
}

impl<'a> Pipeline<'a> {
    pub fn new(ledger: &'a Ledger, sink: &'a dyn RecordSink, notifier: &'a dyn Notifier, stop: StopPolicy) -> Self {
        Self {
            ledger,
            sink,
            notifier,
            stop,
        }
    }

    /// Process one source.
    #[instrument(level = "info", skip_all, fields(source = %adapter.descriptor().state_name))]
    pub async fn run_source(&self, adapter: &dyn SourceAdapter) -> Result<SourceReport, SourceError> {
        let descriptor = adapter.descriptor();
        let candidates = adapter.enumerate().await?;
        info!(count = candidates.len(), "Enumerated candidates");

        let mut report = SourceReport {
            candidates: candidates.len(),
            ..SourceReport::default()
        };
        let mut handled = HashSet::new();

        for candidate in &candidates {
            if let StopPolicy::ScanDepth(depth) = self.stop {
                if report.examined >= depth {
                    info!(depth, "Scan depth reached");
                    break;
                }
            }
            report.examined += 1;

            let Some(identity) = adapter.identity_url(candidate) else {
                warn!(organization = %candidate.organization_name, "Candidate has no link; skipping");
                continue;
            };
            if !handled.insert(identity.clone()) {
                debug!(url = %identity, "Repeated in listing; skipping");
                continue;
            }

            if self.ledger.contains(&identity) {
                match self.stop {
                    StopPolicy::FirstSeen => {
                        info!(url = %identity, "Reached a known notification; stopping");
                        report.stopped_at_seen = true;
                        break;
                    }
                    StopPolicy::ScanDepth(_) => {
                        info!(url = %identity, "Known notification; skipping");
                        continue;
                    }
                }
            }

            info!(url = %identity, organization = %candidate.organization_name, "New notification");
            let Some(record) = adapter.extract(candidate).await else {
                info!(url = %identity, "No record extracted");
                continue;
            };

            if let Err(e) = self.sink.append(descriptor, &record).await {
                error!(url = %record.url, error = %e, "Failed to persist record");
                continue;
            }
            report.persisted.push(record);
        }

        if !report.persisted.is_empty() {
            if let Err(e) = self.notifier.notify(descriptor, &report.persisted).await {
                warn!(error = %e, "Notification not sent");
            }
        }

        info!(
            examined = report.examined,
            persisted = report.persisted.len(),
            "Source run finished"
        );
        Ok(report)
    }

    /// Process every adapter in order. A failing source does not stop the
    /// ones after it.
    pub async fn run_all(&self, adapters: &[Box<dyn SourceAdapter>]) -> RunSummary {
        let mut summary = RunSummary::default();
        for adapter in adapters {
            match self.run_source(adapter.as_ref()).await {
                Ok(report) => {
                    summary.succeeded += 1;
                    summary.records += report.persisted.len();
                }
                Err(e) => {
                    error!(source = %adapter.descriptor().state_name, error = %e, "Source failed");
                    summary.failed += 1;
                }
            }
        }
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            records = summary.records,
            "All sources processed"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BreachCandidate, Capability, SourceDescriptor};
    use crate::notify::fake::RecordingNotifier;
    use crate::outputs::json::fake::MemorySink;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Adapter over a fixed listing; extraction fails for URLs in `rejects`.
    struct ScriptedAdapter {
        descriptor: SourceDescriptor,
        listing: Result<Vec<&'static str>, ()>,
        rejects: Vec<&'static str>,
        extracted: Mutex<Vec<String>>,
    }

    impl ScriptedAdapter {
        fn new(listing: &[&'static str]) -> Self {
            Self {
                descriptor: SourceDescriptor::new("Testland", "https://x.gov/list", Capability::HtmlTable),
                listing: Ok(listing.to_vec()),
                rejects: Vec::new(),
                extracted: Mutex::new(Vec::new()),
            }
        }

        fn broken() -> Self {
            Self {
                listing: Err(()),
                ..Self::new(&[])
            }
        }

        fn rejecting(mut self, url: &'static str) -> Self {
            self.rejects.push(url);
            self
        }

        fn extracted(&self) -> Vec<String> {
            self.extracted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SourceAdapter for ScriptedAdapter {
        fn descriptor(&self) -> &SourceDescriptor {
            &self.descriptor
        }

        async fn enumerate(&self) -> Result<Vec<BreachCandidate>, SourceError> {
            let listing = self
                .listing
                .clone()
                .map_err(|_| SourceError::structure("Testland", "table missing"))?;
            Ok(listing
                .into_iter()
                .map(|href| BreachCandidate {
                    source_identifier: "Testland".into(),
                    organization_name: href.to_uppercase(),
                    occurrence_date_text: "2025-06-18".into(),
                    canonical_url: (!href.is_empty()).then(|| href.to_string()),
                })
                .collect())
        }

        async fn extract(&self, candidate: &BreachCandidate) -> Option<BreachRecord> {
            let url = self.identity_url(candidate)?;
            self.extracted.lock().unwrap().push(url.clone());
            if self.rejects.iter().any(|r| url.ends_with(r)) {
                return None;
            }
            Some(BreachRecord {
                victim: candidate.organization_name.clone(),
                url,
                ..Default::default()
            })
        }
    }

    fn ledger(urls: &[&str]) -> Ledger {
        Ledger::new(
            urls.iter()
                .map(|u| BreachRecord {
                    url: u.to_string(),
                    ..Default::default()
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_stops_at_first_seen() {
        let ledger = ledger(&["https://x.gov/n1"]);
        let sink = MemorySink::new();
        let notifier = RecordingNotifier::new();
        let adapter = ScriptedAdapter::new(&["n3", "n2", "n1", "n0"]);

        let pipeline = Pipeline::new(&ledger, &sink, &notifier, StopPolicy::FirstSeen);
        let report = pipeline.run_source(&adapter).await.unwrap();

        assert_eq!(adapter.extracted(), ["https://x.gov/n3", "https://x.gov/n2"]);
        let saved: Vec<String> = sink.saved().into_iter().map(|r| r.url).collect();
        assert_eq!(saved, ["https://x.gov/n3", "https://x.gov/n2"]);
        assert!(report.stopped_at_seen);

        let calls = notifier.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "Testland");
        assert_eq!(calls[0].1.len(), 2);
    }

    #[tokio::test]
    async fn test_first_candidate_known_is_a_quiet_success() {
        let ledger = ledger(&["https://x.gov/n3"]);
        let sink = MemorySink::new();
        let notifier = RecordingNotifier::new();
        let adapter = ScriptedAdapter::new(&["n3", "n2"]);

        let pipeline = Pipeline::new(&ledger, &sink, &notifier, StopPolicy::FirstSeen);
        let report = pipeline.run_source(&adapter).await.unwrap();
        assert!(report.persisted.is_empty());
        assert!(adapter.extracted().is_empty());
        assert!(notifier.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_listing_succeeds() {
        let ledger = Ledger::default();
        let sink = MemorySink::new();
        let notifier = RecordingNotifier::new();
        let pipeline = Pipeline::new(&ledger, &sink, &notifier, StopPolicy::FirstSeen);
        let report = pipeline.run_source(&ScriptedAdapter::new(&[])).await.unwrap();
        assert_eq!(report, SourceReport::default());
        assert!(notifier.calls().is_empty());
    }

    #[tokio::test]
    async fn test_structural_failure_fails_the_source() {
        let ledger = Ledger::default();
        let sink = MemorySink::new();
        let notifier = RecordingNotifier::new();
        let pipeline = Pipeline::new(&ledger, &sink, &notifier, StopPolicy::FirstSeen);
        let result = pipeline.run_source(&ScriptedAdapter::broken()).await;
        assert!(matches!(result, Err(SourceError::Structure { .. })));
    }

    #[tokio::test]
    async fn test_filtered_and_unlinked_candidates_are_skipped() {
        let ledger = Ledger::default();
        let sink = MemorySink::new();
        let notifier = RecordingNotifier::new();
        let adapter = ScriptedAdapter::new(&["n3", "", "n2"]).rejecting("n3");

        let pipeline = Pipeline::new(&ledger, &sink, &notifier, StopPolicy::FirstSeen);
        let report = pipeline.run_source(&adapter).await.unwrap();
        assert_eq!(report.examined, 3);
        assert_eq!(adapter.extracted(), ["https://x.gov/n3", "https://x.gov/n2"]);
        let saved: Vec<String> = sink.saved().into_iter().map(|r| r.url).collect();
        assert_eq!(saved, ["https://x.gov/n2"]);
    }

    #[tokio::test]
    async fn test_repeated_listing_entry_is_handled_once() {
        let ledger = Ledger::default();
        let sink = MemorySink::new();
        let notifier = RecordingNotifier::new();
        let adapter = ScriptedAdapter::new(&["n2", "n2", "n1", "n2"]);

        let pipeline = Pipeline::new(&ledger, &sink, &notifier, StopPolicy::FirstSeen);
        let report = pipeline.run_source(&adapter).await.unwrap();
        assert_eq!(adapter.extracted(), ["https://x.gov/n2", "https://x.gov/n1"]);
        let saved: Vec<String> = sink.saved().into_iter().map(|r| r.url).collect();
        assert_eq!(saved, ["https://x.gov/n2", "https://x.gov/n1"]);
        assert_eq!(report.persisted.len(), 2);
        assert_eq!(notifier.calls()[0].1.len(), 2);
    }

    #[tokio::test]
    async fn test_persist_and_notify_failures_do_not_fail_the_source() {
        let ledger = Ledger::default();
        let sink = MemorySink::failing_on("https://x.gov/n2");
        let notifier = RecordingNotifier::failing();
        let adapter = ScriptedAdapter::new(&["n2", "n1"]);

        let pipeline = Pipeline::new(&ledger, &sink, &notifier, StopPolicy::FirstSeen);
        let report = pipeline.run_source(&adapter).await.unwrap();
        assert_eq!(report.persisted.len(), 1);
        assert_eq!(report.persisted[0].url, "https://x.gov/n1");
        assert_eq!(notifier.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_second_run_against_updated_ledger_finds_nothing() {
        let sink = MemorySink::new();
        let notifier = RecordingNotifier::new();
        let adapter = ScriptedAdapter::new(&["n3", "n2", "n1"]);

        let mut ledger = ledger(&["https://x.gov/n1"]);
        let first = Pipeline::new(&ledger, &sink, &notifier, StopPolicy::FirstSeen)
            .run_source(&adapter)
            .await
            .unwrap();
        for record in first.persisted {
            ledger.insert(record);
        }

        let second = Pipeline::new(&ledger, &sink, &notifier, StopPolicy::FirstSeen)
            .run_source(&adapter)
            .await
            .unwrap();
        assert!(second.persisted.is_empty());
        assert_eq!(second.examined, 1);
    }

    #[tokio::test]
    async fn test_scan_depth_skips_known_without_stopping() {
        let ledger = ledger(&["https://x.gov/n3"]);
        let sink = MemorySink::new();
        let notifier = RecordingNotifier::new();
        let adapter = ScriptedAdapter::new(&["n4", "n3", "n2", "n1"]);

        let pipeline = Pipeline::new(&ledger, &sink, &notifier, StopPolicy::ScanDepth(3));
        let report = pipeline.run_source(&adapter).await.unwrap();
        assert_eq!(report.examined, 3);
        assert!(!report.stopped_at_seen);
        let saved: Vec<String> = sink.saved().into_iter().map(|r| r.url).collect();
        assert_eq!(saved, ["https://x.gov/n4", "https://x.gov/n2"]);
    }

    #[tokio::test]
    async fn test_run_all_counts_failures_and_continues() {
        let ledger = Ledger::default();
        let sink = MemorySink::new();
        let notifier = RecordingNotifier::new();
        let adapters: Vec<Box<dyn SourceAdapter>> = vec![
            Box::new(ScriptedAdapter::broken()),
            Box::new(ScriptedAdapter::new(&["n1"])),
        ];
        let pipeline = Pipeline::new(&ledger, &sink, &notifier, StopPolicy::FirstSeen);
        let summary = pipeline.run_all(&adapters).await;
        assert_eq!(
            summary,
            RunSummary {
                succeeded: 1,
                failed: 1,
                records: 1
            }
        );
        assert!(!summary.all_succeeded());
    }

    #[test]
    fn test_stop_policy_from_scan_depth() {
        assert_eq!(StopPolicy::from_scan_depth(None), StopPolicy::FirstSeen);
        assert_eq!(StopPolicy::from_scan_depth(Some(5)), StopPolicy::ScanDepth(5));
    }
}
