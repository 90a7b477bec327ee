//! Language-model API interaction with exponential backoff retry logic.
//!
//! This module provides the interface for talking to an OpenAI-compatible
//! chat completion endpoint (OpenAI, Groq, a local server, ...).
//!
//! # Architecture
//!
//! - [`LanguageModel`]: core trait; send a [`ChatRequest`], get the text of
//!   the first choice back
//! - [`OpenAiClient`]: `reqwest` implementation of the `/chat/completions`
//!   endpoint
//! - [`RetryAsk`]: decorator that adds retry logic to any [`LanguageModel`]
//!
//! # Retry Strategy
//!
//! - Configurable maximum number of retries
//! - Exponential backoff starting at 1 second, capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::retry::Backoff;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

/// A chat message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    /// `"system"`, `"user"` or `"assistant"`.
    pub role: &'static str,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// A model-agnostic chat completion request. The client supplies the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask for a JSON object response (`response_format: json_object`).
    pub json_response: bool,
}

impl ChatRequest {
    /// A system + user exchange with the given sampling settings.
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system), Message::user(user)],
            temperature: 0.1,
            max_tokens: 256,
            json_response: false,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_response = true;
        self
    }
}

/// Trait for language-model interaction.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send the request and return the content of the first choice.
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
}

/// `reqwest` client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiClient {
    /// Build a client from configuration; fails without an API key.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LlmError::Config("no API key configured".into()))?;
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;
        Ok(Self {
            http_client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    /// Same endpoint and key, different model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    #[instrument(level = "debug", skip_all, fields(model = %self.model))]
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let t0 = Instant::now();
        let body = WireRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            n: 1,
            response_format: request.json_response.then_some(ResponseFormat { kind: "json_object" }),
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "Model API error");
            return Err(LlmError::Api(format!("HTTP {}: {}", status.as_u16(), error_text)));
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Api("response contained no choices".into()))?;

        debug!(elapsed_ms = t0.elapsed().as_millis() as u64, "Chat completion finished");
        Ok(content)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`LanguageModel`].
///
/// Designed to be resilient against rate limiting, network issues, and
/// temporary server errors. Configuration errors are not retried.
pub struct RetryAsk<T> {
    /// The underlying client to wrap.
    inner: T,
    backoff: Backoff,
}

impl<T> RetryAsk<T>
where
    T: LanguageModel,
{
    /// # Example
    ///
    /// ```ignore
    /// let client = OpenAiClient::from_config(&config.llm)?;
    /// let retrying = RetryAsk::new(client, 5, Duration::from_secs(1));
    /// ```
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            backoff: Backoff::new(max_retries, base_delay),
        }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.backoff.max_retries)
            .field("base_delay", &self.backoff.base_delay)
            .field("max_delay", &self.backoff.max_delay)
            .finish()
    }
}

#[async_trait]
impl<T> LanguageModel for RetryAsk<T>
where
    T: LanguageModel,
{
    #[instrument(level = "debug", skip_all)]
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.complete(request).await {
                Ok(resp) => return Ok(resp),
                Err(e @ LlmError::Config(_)) => return Err(e),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if !self.backoff.allows(attempt) {
                        error!(
                            attempt,
                            max = self.backoff.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "complete() exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff.delay_for(attempt);
                    warn!(
                        attempt,
                        max = self.backoff.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "complete() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fake::ScriptedModel;
    use super::*;

    #[test]
    fn test_wire_request_shape() {
        let req = ChatRequest::new("sys", "usr").max_tokens(400).json();
        let body = WireRequest {
            model: "m",
            messages: &req.messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            n: 1,
            response_format: req.json_response.then_some(ResponseFormat { kind: "json_object" }),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "m");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "usr");
        assert_eq!(json["max_tokens"], 400);
        assert_eq!(json["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_client_requires_api_key() {
        let config = LlmConfig::default();
        assert!(matches!(
            OpenAiClient::from_config(&config),
            Err(LlmError::Config(_))
        ));

        let config = LlmConfig {
            api_key: Some("sk-test".into()),
            base_url: "https://api.example.com/v1/".into(),
            ..LlmConfig::default()
        };
        let client = OpenAiClient::from_config(&config).unwrap().with_model("other");
        assert_eq!(client.base_url, "https://api.example.com/v1");
        assert_eq!(client.model(), "other");
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let model = ScriptedModel::new()
            .fail(LlmError::Network("reset".into()))
            .reply("ok");
        let retrying = RetryAsk::new(model, 2, Duration::from_millis(1));
        let out = retrying.complete(&ChatRequest::new("s", "u")).await.unwrap();
        assert_eq!(out, "ok");
        assert_eq!(retrying.inner.prompts().len(), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_budget() {
        let model = ScriptedModel::new()
            .fail(LlmError::Api("500".into()))
            .fail(LlmError::Api("500".into()));
        let retrying = RetryAsk::new(model, 1, Duration::from_millis(1));
        assert!(retrying.complete(&ChatRequest::new("s", "u")).await.is_err());
        assert_eq!(retrying.inner.prompts().len(), 2);
    }

    #[tokio::test]
    async fn test_retry_does_not_retry_config_errors() {
        let model = ScriptedModel::new().fail(LlmError::Config("no key".into()));
        let retrying = RetryAsk::new(model, 3, Duration::from_millis(1));
        assert!(matches!(
            retrying.complete(&ChatRequest::new("s", "u")).await,
            Err(LlmError::Config(_))
        ));
        assert_eq!(retrying.inner.prompts().len(), 1);
    }
}
