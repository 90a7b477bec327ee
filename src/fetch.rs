//! HTTP retrieval of listings and documents.
//!
//! The [`Fetch`] trait is the only way adapters, the extractor and the
//! discovery chain touch the network, which keeps them testable with an
//! in-memory fake. [`HttpFetcher`] is the real implementation: a single
//! `reqwest::Client` with a fixed browser-like header set, a per-request
//! timeout, and bounded retries with exponential backoff for transient
//! failures (connection errors, timeouts, 429 and 5xx).

use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::retry::Backoff;
use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

/// Extra request headers as `(name, value)` pairs.
pub type Headers<'a> = &'a [(&'static str, &'static str)];

#[async_trait]
pub trait Fetch: Send + Sync {
    /// GET `url` and return the body as text.
    async fn text(&self, url: &str) -> Result<String, FetchError>;

    /// GET `url` with additional headers and return the body as text.
    async fn text_with_headers(&self, url: &str, headers: Headers<'_>) -> Result<String, FetchError>;

    /// GET `url` and return the raw body.
    async fn bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Network-backed [`Fetch`] implementation.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    backoff: Backoff,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .map_err(|e| FetchError::Network {
                url: String::new(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            backoff: Backoff::new(config.retries, Duration::from_secs(1)),
        })
    }

    /// Send the request built by `build`, retrying transient failures.
    async fn send(
        &self,
        url: &str,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<reqwest::Response, FetchError> {
        let t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let result = build().send().await;
            let error = match result {
                Ok(resp) if resp.status().is_success() => {
                    debug!(%url, status = resp.status().as_u16(), elapsed_ms = t0.elapsed().as_millis() as u64, "Fetched");
                    return Ok(resp);
                }
                Ok(resp) => {
                    let status = resp.status();
                    let err = FetchError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                    };
                    if !is_transient(status) {
                        return Err(err);
                    }
                    err
                }
                Err(e) => FetchError::Network {
                    url: url.to_string(),
                    message: e.to_string(),
                },
            };

            attempt += 1;
            if !self.backoff.allows(attempt) {
                return Err(error);
            }
            let delay = self.backoff.delay_for(attempt);
            warn!(%url, attempt, ?delay, error = %error, "Fetch failed; backing off");
            sleep(delay).await;
        }
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn body_error(url: &str, e: reqwest::Error) -> FetchError {
    FetchError::Network {
        url: url.to_string(),
        message: e.to_string(),
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn text(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.send(url, || self.client.get(url)).await?;
        resp.text().await.map_err(|e| body_error(url, e))
    }

    #[instrument(level = "debug", skip(self, headers))]
    async fn text_with_headers(&self, url: &str, headers: Headers<'_>) -> Result<String, FetchError> {
        let resp = self
            .send(url, || {
                headers
                    .iter()
                    .fold(self.client.get(url), |req, (name, value)| req.header(*name, *value))
            })
            .await?;
        resp.text().await.map_err(|e| body_error(url, e))
    }

    #[instrument(level = "debug", skip(self))]
    async fn bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let resp = self.send(url, || self.client.get(url)).await?;
        let body = resp.bytes().await.map_err(|e| body_error(url, e))?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
pub mod fake {
    //! In-memory [`Fetch`] used across the crate's tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    pub struct FakeFetch {
        pages: HashMap<String, Vec<u8>>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeFetch {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_page(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
            self.pages.insert(url.to_string(), body.into());
            self
        }

        /// Every URL requested so far, in order.
        pub fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }

        fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            self.pages.get(url).cloned().ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    #[async_trait]
    impl Fetch for FakeFetch {
        async fn text(&self, url: &str) -> Result<String, FetchError> {
            self.get(url).map(|b| String::from_utf8_lossy(&b).into_owned())
        }

        async fn text_with_headers(&self, url: &str, _headers: Headers<'_>) -> Result<String, FetchError> {
            self.text(url).await
        }

        async fn bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.get(url)
        }
    }
}
