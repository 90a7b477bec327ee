//! RSS 2.0 documents, read and written through `quick-xml`'s serde support.
//!
//! The same types read the Google News search feeds (which carry a
//! `<source url="...">Publisher</source>` per item) and the triage feeds this
//! crate writes back out.

use crate::error::NewsError;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "rss")]
pub struct Rss {
    #[serde(rename = "@version", default = "rss_version")]
    pub version: String,
    pub channel: Channel,
}

fn rss_version() -> String {
    "2.0".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(rename = "item", default)]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<Guid>,
    #[serde(rename = "pubDate", default, skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ItemSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Guid {
    #[serde(rename = "@isPermaLink", default, skip_serializing_if = "Option::is_none")]
    pub is_perma_link: Option<String>,
    #[serde(rename = "$text", default)]
    pub value: String,
}

/// Publisher of an aggregated item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemSource {
    #[serde(rename = "@url", default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "$text", default)]
    pub name: String,
}

impl Item {
    /// An item identified by its link.
    pub fn new(title: impl Into<String>, link: impl Into<String>, published: DateTime<FixedOffset>) -> Self {
        let link = link.into();
        Self {
            title: title.into(),
            guid: Some(Guid {
                is_perma_link: Some("false".to_string()),
                value: link.clone(),
            }),
            link,
            pub_date: Some(published.to_rfc2822()),
            source: None,
        }
    }

    pub fn published(&self) -> Option<DateTime<FixedOffset>> {
        self.pub_date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.name.trim())
    }
}

impl Rss {
    pub fn new(channel: Channel) -> Self {
        Self {
            version: rss_version(),
            channel,
        }
    }

    pub fn parse(xml: &str) -> Result<Self, quick_xml::de::DeError> {
        quick_xml::de::from_str(xml)
    }

    /// Drop items published before `cutoff`, and items whose date cannot
    /// be read. Returns the number removed.
    pub fn prune_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.channel.items.len();
        self.channel
            .items
            .retain(|item| item.published().is_some_and(|p| p >= cutoff));
        before - self.channel.items.len()
    }

    /// Pretty-printed document with an XML declaration.
    pub fn to_xml(&self) -> Result<String, String> {
        let mut body = String::new();
        let mut ser = quick_xml::se::Serializer::new(&mut body);
        ser.indent(' ', 2);
        self.serialize(ser).map_err(|e| e.to_string())?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}\n"))
    }
}

/// Read the items of a previously written feed. A missing or unreadable
/// file has no items.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn read_items(path: &Path) -> Vec<Item> {
    let Ok(xml) = fs::read_to_string(path).await else {
        debug!("No existing feed");
        return Vec::new();
    };
    match Rss::parse(&xml) {
        Ok(rss) => {
            info!(count = rss.channel.items.len(), "Loaded existing feed entries");
            rss.channel.items
        }
        Err(e) => {
            warn!(error = %e, "Existing feed is unreadable; starting empty");
            Vec::new()
        }
    }
}

/// Write `rss` to `path`, replacing the file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_feed(path: &Path, rss: &Rss) -> Result<(), NewsError> {
    let xml = rss.to_xml().map_err(|message| NewsError::Encode {
        path: path.display().to_string(),
        message,
    })?;
    fs::write(path, xml).await.map_err(|source| NewsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    info!(count = rss.channel.items.len(), "Wrote feed");
    Ok(())
}
