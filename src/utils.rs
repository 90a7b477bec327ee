//! Utility functions for dates, URLs, string manipulation, and file system operations.
//!
//! This module provides helper functions used throughout the application:
//! - The "yesterday" reference date that listing filters compare against
//! - Lenient date parsing for free-form dates printed on notice pages
//! - Relative link resolution against a listing URL
//! - String truncation for logging and JSON truncation detection
//! - File system validation for output directories

use chrono::{Duration, Local, NaiveDate};
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

/// Formats tried, in order, by [`parse_loose_date`].
const LOOSE_DATE_FORMATS: [&str; 9] = [
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
    "%b. %d, %Y",
    "%Y/%m/%d",
];

/// The calendar day before today in local time.
///
/// Every date-filtered listing compares its dates against this day.
pub fn yesterday() -> NaiveDate {
    Local::now().date_naive() - Duration::days(1)
}

/// Parse a human-written date into `YYYY-MM-DD`.
///
/// Accepts the formats in [`LOOSE_DATE_FORMATS`]. For ranges such as
/// `"05/01/2025 - 05/03/2025"` or `"May 1, 2025 to May 3, 2025"` the start of
/// the range is used.
///
/// # Returns
///
/// `None` when no known format matches.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(parse_loose_date("May 12, 2025").as_deref(), Some("2025-05-12"));
/// assert_eq!(parse_loose_date("soon"), None);
/// ```
pub fn parse_loose_date(text: &str) -> Option<String> {
    let text = text.trim();
    let first = [" - ", " – ", " to ", " and ", ";"]
        .iter()
        .filter_map(|sep| text.split_once(sep).map(|(head, _)| head.trim()))
        .min_by_key(|head| head.len())
        .unwrap_or(text);

    [text, first].iter().find_map(|candidate| {
        LOOSE_DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(candidate, fmt).ok())
            .map(|d| d.format("%Y-%m-%d").to_string())
    })
}

/// Resolve `href` against `base`, returning an absolute URL.
///
/// Absolute hrefs are returned normalized; empty hrefs and unparseable
/// combinations yield `None`.
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let base = Url::parse(base).ok()?;
    base.join(href).ok().map(String::from)
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to at most `max` bytes (on a character
/// boundary) with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When the model response is cut off by the token limit, the resulting
/// JSON fails to parse with an EOF error. The extractor re-asks once in
/// that case.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then performs a write test by
/// creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        let result = truncate_for_log("ééé", 3);
        assert!(result.starts_with('é'));
        assert!(result.ends_with("…(+4 bytes)"));
    }

    #[test]
    fn test_looks_truncated() {
        let json_eof = r#"{"field": "value"#; // Missing closing brace
        let err = serde_json::from_str::<serde_json::Value>(json_eof).unwrap_err();
        assert!(looks_truncated(&err));

        let err = serde_json::from_str::<serde_json::Value>("{]").unwrap_err();
        assert!(!looks_truncated(&err));
    }

    #[test]
    fn test_parse_loose_date_formats() {
        assert_eq!(parse_loose_date("2025-06-18").as_deref(), Some("2025-06-18"));
        assert_eq!(parse_loose_date("06/18/2025").as_deref(), Some("2025-06-18"));
        assert_eq!(parse_loose_date("June 18, 2025").as_deref(), Some("2025-06-18"));
        assert_eq!(parse_loose_date("Jun 18, 2025").as_deref(), Some("2025-06-18"));
        assert_eq!(parse_loose_date(" 18 June 2025 ").as_deref(), Some("2025-06-18"));
    }

    #[test]
    fn test_parse_loose_date_ranges_use_start() {
        assert_eq!(
            parse_loose_date("05/01/2025 - 05/03/2025").as_deref(),
            Some("2025-05-01")
        );
        assert_eq!(
            parse_loose_date("May 1, 2025 to May 3, 2025").as_deref(),
            Some("2025-05-01")
        );
    }

    #[test]
    fn test_parse_loose_date_rejects_garbage() {
        assert_eq!(parse_loose_date("unknown"), None);
        assert_eq!(parse_loose_date(""), None);
    }

    #[test]
    fn test_resolve_url() {
        let base = "https://www.maine.gov/agviewer/content/ag/x/list.html";
        assert_eq!(
            resolve_url(base, "viewer.html?id=1").as_deref(),
            Some("https://www.maine.gov/agviewer/content/ag/x/viewer.html?id=1")
        );
        assert_eq!(
            resolve_url(base, "/files/n.pdf").as_deref(),
            Some("https://www.maine.gov/files/n.pdf")
        );
        assert_eq!(
            resolve_url(base, "https://other.gov/a.pdf").as_deref(),
            Some("https://other.gov/a.pdf")
        );
        assert_eq!(resolve_url(base, "  "), None);
    }

    #[test]
    fn test_yesterday_is_before_today() {
        assert_eq!(yesterday() + Duration::days(1), Local::now().date_naive());
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        ensure_writable_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
    }
}
