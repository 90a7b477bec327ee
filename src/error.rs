//! Error types shared across the pipeline.
//!
//! Each layer has its own enum so callers can decide where a failure stops:
//! a [`FetchError`] or [`SourceError`] ends the current source run, while
//! per-item problems never surface as errors at all (adapters return `None`).

use thiserror::Error;

/// Network retrieval failures.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection failed, timed out, or the body could not be read.
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    /// The server answered with a non-2xx status.
    #[error("request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Failures that abort a single source run.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The listing endpoint could not be retrieved.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The listing was retrieved but its expected root (table, feed, `data`
    /// field) is missing or unparseable. Distinct from "zero items".
    #[error("{source_name}: unrecognized listing structure: {detail}")]
    Structure { source_name: String, detail: String },
}

impl SourceError {
    pub fn structure(source_name: &str, detail: impl Into<String>) -> Self {
        Self::Structure {
            source_name: source_name.to_string(),
            detail: detail.into(),
        }
    }
}

/// Language-model client failures.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Missing API key or invalid client settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection failed or timed out.
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx response or empty choice list.
    #[error("API error: {0}")]
    Api(String),

    /// The response body did not have the expected shape.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Failures writing a record to its per-source output file.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not encode records for {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures dispatching a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Bot token or chat id not supplied; the notification is skipped.
    #[error("notification credentials are not configured")]
    MissingCredentials,

    #[error("notification request failed: {0}")]
    Request(String),

    #[error("notification rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Failures loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Failures in the news triage pipeline that stop the whole run.
#[derive(Debug, Error)]
pub enum NewsError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not encode feed {path}: {message}")]
    Encode { path: String, message: String },
}
