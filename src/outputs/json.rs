//! Per-source JSON output files.
//!
//! Every new record is appended to `new_notification_<source>.json` in the
//! output directory as soon as it is extracted, so a crash later in the run
//! keeps what was already found.
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── new_notification_maine.json
//! ├── new_notification_new_hampshire.json
//! └── ...
//! ```
//!
//! Each file is a JSON array of records, pretty-printed with four-space
//! indentation. An existing file that is unreadable or not an array is
//! replaced.

use crate::error::PersistError;
use crate::models::{BreachRecord, SourceDescriptor};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument, warn};

/// File name of the per-source output file.
pub fn output_file_name(source: &SourceDescriptor) -> String {
    format!("new_notification_{}.json", source.slug())
}

/// Durable destination for newly extracted records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Append one record to `source`'s list.
    async fn append(&self, source: &SourceDescriptor, record: &BreachRecord) -> Result<(), PersistError>;
}

/// [`RecordSink`] writing one JSON array file per source.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, source: &SourceDescriptor) -> PathBuf {
        self.dir.join(output_file_name(source))
    }
}

/// Existing records of `path`; anything but a readable JSON array is empty.
async fn read_existing(path: &Path) -> Vec<serde_json::Value> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable output file; replacing it");
            return Vec::new();
        }
    };
    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(serde_json::Value::Array(items)) => items,
        Ok(_) => {
            warn!(path = %path.display(), "Output file is not a JSON array; replacing it");
            Vec::new()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Output file is not valid JSON; replacing it");
            Vec::new()
        }
    }
}

fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser)?;
    Ok(out)
}

#[async_trait]
impl RecordSink for JsonFileSink {
    #[instrument(level = "info", skip_all, fields(source = %source.state_name, url = %record.url))]
    async fn append(&self, source: &SourceDescriptor, record: &BreachRecord) -> Result<(), PersistError> {
        let path = self.path_for(source);
        let io_err = |e: std::io::Error| PersistError::Io {
            path: path.display().to_string(),
            source: e,
        };

        let mut items = read_existing(&path).await;
        let value = serde_json::to_value(record).map_err(|e| PersistError::Encode {
            path: path.display().to_string(),
            source: e,
        })?;
        items.push(value);

        let json = to_pretty_json(&items).map_err(|e| PersistError::Encode {
            path: path.display().to_string(),
            source: e,
        })?;

        fs::create_dir_all(&self.dir).await.map_err(io_err)?;
        fs::write(&path, json).await.map_err(io_err)?;
        info!(path = %path.display(), total = items.len(), "Saved record");
        Ok(())
    }
}

#[cfg(test)]
pub mod fake {
    //! In-memory [`RecordSink`].

    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    pub struct MemorySink {
        saved: Mutex<Vec<BreachRecord>>,
        /// Identity URLs whose append fails.
        failing: Vec<String>,
    }

    impl MemorySink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_on(url: &str) -> Self {
            Self {
                failing: vec![url.to_string()],
                ..Self::default()
            }
        }

        pub fn saved(&self) -> Vec<BreachRecord> {
            self.saved.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RecordSink for MemorySink {
        async fn append(&self, _source: &SourceDescriptor, record: &BreachRecord) -> Result<(), PersistError> {
            if self.failing.contains(&record.url) {
                return Err(PersistError::Io {
                    path: "memory".into(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.saved.lock().unwrap().push(record.clone());
            Ok(())
        }
    }
}
