//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the harvester, including:
//! - Building the HTTP client with the configured user agent and timeout
//! - Rate limiting before each logical fetch
//! - Retry with exponential backoff for non-200 responses and transport errors
//!
//! A fetch never fails the run. Exhausting the retries yields a
//! `FetchFailure` value and the caller decides whether to skip.

use crate::config::{SourceConfig, ThrottleConfig};
use crate::crawler::RateLimiter;
use reqwest::{Client, Response, StatusCode};
use scraper::Html;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The source configuration (user agent and per-attempt timeout)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &SourceConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.timeout())
        .connect_timeout(Duration::from_secs(10).min(config.timeout()))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Backoff slept after failed attempt `attempt` (0-based): `base * 2^attempt`
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// A successfully fetched HTML page
///
/// Holds the raw body; `parse` builds the DOM on demand so the document can
/// cross await points.
#[derive(Debug, Clone)]
pub struct Document {
    pub url: Url,
    body: String,
}

impl Document {
    pub fn new(url: Url, body: String) -> Self {
        Self { url, body }
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn parse(&self) -> Html {
        Html::parse_document(&self.body)
    }
}

/// Terminal outcome of a fetch whose attempts were all exhausted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub url: String,
    pub attempts: u32,
    pub reason: String,
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed after {} attempt(s): {}",
            self.url, self.attempts, self.reason
        )
    }
}

enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

/// Sequential fetcher with rate limiting and exponential backoff
pub struct RetryingFetcher {
    client: Client,
    limiter: RateLimiter,
    max_retries: u32,
    retry_delay: Duration,
    cancel: Option<CancellationToken>,
    requests: u64,
}

impl RetryingFetcher {
    pub fn new(client: Client, throttle: &ThrottleConfig) -> Self {
        Self {
            client,
            limiter: RateLimiter::new(throttle.request_delay()),
            max_retries: throttle.max_retries,
            retry_delay: throttle.retry_delay(),
            cancel: None,
            requests: 0,
        }
    }

    /// Cuts backoff sleeps short when the token is cancelled
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Number of HTTP attempts sent so far
    pub fn requests_sent(&self) -> u64 {
        self.requests
    }

    /// Fetches an HTML page
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | HTTP 200 | Return the document |
    /// | Any other status | Retry after backoff |
    /// | Timeout / transport error | Retry after backoff |
    /// | Body read error | Retry after backoff |
    ///
    /// At most `max_retries + 1` attempts are sent. The rate limiter is
    /// consulted once, before the first attempt.
    pub async fn fetch(&mut self, url: &Url) -> Result<Document, FetchFailure> {
        match self.fetch_payload(url, false).await? {
            Payload::Text(body) => Ok(Document::new(url.clone(), body)),
            Payload::Bytes(bytes) => Ok(Document::new(
                url.clone(),
                String::from_utf8_lossy(&bytes).into_owned(),
            )),
        }
    }

    /// Fetches raw bytes (images) with the same retry policy
    pub async fn fetch_bytes(&mut self, url: &Url) -> Result<Vec<u8>, FetchFailure> {
        match self.fetch_payload(url, true).await? {
            Payload::Bytes(bytes) => Ok(bytes),
            Payload::Text(text) => Ok(text.into_bytes()),
        }
    }

    async fn fetch_payload(&mut self, url: &Url, binary: bool) -> Result<Payload, FetchFailure> {
        self.limiter.wait().await;

        let total_attempts = self.max_retries + 1;
        let mut last_error = String::new();

        for attempt in 0..total_attempts {
            self.requests += 1;

            match self.attempt(url, binary).await {
                Ok(payload) => {
                    if attempt > 0 {
                        tracing::info!(url = %url, attempt, "Fetch succeeded after retry");
                    }
                    return Ok(payload);
                }
                Err(reason) => {
                    tracing::warn!(
                        url = %url,
                        attempt = attempt + 1,
                        of = total_attempts,
                        "Attempt failed: {}",
                        reason
                    );
                    last_error = reason;
                }
            }

            if attempt < self.max_retries {
                let backoff = backoff_delay(self.retry_delay, attempt);
                tracing::debug!(url = %url, "Backing off for {:?}", backoff);
                if !self.sleep_unless_cancelled(backoff).await {
                    return Err(FetchFailure {
                        url: url.to_string(),
                        attempts: attempt + 1,
                        reason: format!("cancelled during backoff ({})", last_error),
                    });
                }
            }
        }

        Err(FetchFailure {
            url: url.to_string(),
            attempts: total_attempts,
            reason: last_error,
        })
    }

    async fn attempt(&self, url: &Url, binary: bool) -> Result<Payload, String> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        read_body(response, binary)
            .await
            .map_err(|e| format!("failed to read body: {}", e))
    }

    /// Returns false when the sleep was interrupted by cancellation
    async fn sleep_unless_cancelled(&self, duration: Duration) -> bool {
        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => false,
                    _ = tokio::time::sleep(duration) => true,
                }
            }
            None => {
                tokio::time::sleep(duration).await;
                true
            }
        }
    }
}

async fn read_body(response: Response, binary: bool) -> Result<Payload, reqwest::Error> {
    if binary {
        Ok(Payload::Bytes(response.bytes().await?.to_vec()))
    } else {
        Ok(Payload::Text(response.text().await?))
    }
}

fn classify_transport_error(e: reqwest::Error) -> String {
    if e.is_timeout() {
        "request timeout".to_string()
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    }
}
