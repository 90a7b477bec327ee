//! Output generation.
//!
//! # Submodules
//!
//! - [`json`]: appends new breach records to per-source JSON files
//! - [`rss`]: reads and writes the RSS 2.0 feeds produced by news triage

pub mod json;
pub mod rss;
