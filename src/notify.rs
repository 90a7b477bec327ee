//! Notification of newly found breach records.
//!
//! One message per source run summarizes every record persisted during that
//! run. [`TelegramNotifier`] delivers it through the Bot API `sendMessage`
//! method with Markdown formatting.

use crate::config::TelegramConfig;
use crate::error::NotifyError;
use crate::models::{BreachRecord, SourceDescriptor};
use crate::outputs::json::output_file_name;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{info, instrument};

/// Summary message for `records` found at `source`.
///
/// ```text
/// 🚨 *Maine Breach Monitor Alert*
///
/// Found 2 new breach notification(s):
///
/// 1. *Acme Dental*
///    Date: 2025-05-30
///    URL: https://...
///
/// All details saved to `new_notification_maine.json`
/// ```
pub fn format_message(source: &SourceDescriptor, records: &[BreachRecord]) -> String {
    let mut message = format!("🚨 *{} Breach Monitor Alert*\n\n", source.state_name);
    let _ = write!(message, "Found {} new breach notification(s):\n\n", records.len());
    for (i, record) in records.iter().enumerate() {
        let _ = write!(
            message,
            "{}. *{}*\n   Date: {}\n   URL: {}\n\n",
            i + 1,
            record.victim,
            record.date,
            record.url
        );
    }
    let _ = write!(message, "All details saved to `{}`", output_file_name(source));
    message
}

/// Destination for run summaries.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, source: &SourceDescriptor, records: &[BreachRecord]) -> Result<(), NotifyError>;
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

/// Telegram Bot API notifier.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    http_client: Client,
    api_base: String,
    bot_token: Option<String>,
    chat_id: Option<String>,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http_client,
            api_base: "https://api.telegram.org".to_string(),
            bot_token: config.bot_token.clone().filter(|t| !t.is_empty()),
            chat_id: config.chat_id.clone().filter(|c| !c.is_empty()),
        }
    }

    fn endpoint(&self, token: &str) -> String {
        format!("{}/bot{token}/sendMessage", self.api_base)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    #[instrument(level = "info", skip_all, fields(source = %source.state_name, count = records.len()))]
    async fn notify(&self, source: &SourceDescriptor, records: &[BreachRecord]) -> Result<(), NotifyError> {
        let (Some(token), Some(chat_id)) = (&self.bot_token, &self.chat_id) else {
            return Err(NotifyError::MissingCredentials);
        };

        let text = format_message(source, records);
        let response = self
            .http_client
            .post(self.endpoint(token))
            .json(&SendMessage {
                chat_id,
                text: &text,
                parse_mode: "Markdown",
            })
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        info!("Telegram notification sent");
        Ok(())
    }
}
