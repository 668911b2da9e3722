use std::num::NonZeroU32;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tokio::time::sleep;

use super::throttle::Throttle;

const EXCERPT_CHARS: usize = 300;

#[derive(Error, Debug)]
pub enum SourceError {
    /// Rate limited or momentarily unavailable; the same request may be retried.
    #[error("transient source error {status}: {excerpt}")]
    Transient { status: u16, excerpt: String },
    /// Malformed request, auth failure or missing resource; do not retry.
    #[error("fatal source error {status}: {excerpt}")]
    Fatal { status: u16, excerpt: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("undecodable response: {0}")]
    Decode(String),
    #[error("gave up after {0} pages")]
    PageLimit(u32),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Transient { .. } => true,
            SourceError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Auth {
    None,
    /// Static token sent verbatim in a request header.
    Header { name: String, value: String },
    /// Static token sent as a query parameter.
    Query { name: String, value: String },
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
    /// Grow the delay linearly with the attempt number.
    pub incrementing: bool,
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        if self.incrementing {
            self.delay * (attempt + 1)
        } else {
            self.delay
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            delay: Duration::from_secs(1),
            incrementing: true,
        }
    }
}

/// Rate-limited JSON client for one remote source.
pub struct ApiClient {
    http: Client,
    base_url: String,
    auth: Auth,
    throttle: Throttle,
}

impl ApiClient {
    pub fn new(base_url: &str, auth: Auth, rpm_limit: NonZeroU32) -> Result<Self, SourceError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            throttle: Throttle::per_minute(rpm_limit),
        })
    }

    /// One throttled GET of `endpoint` with query `params`.
    pub async fn call(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value, SourceError> {
        self.throttle.acquire().await;

        let url = format!("{}{}", self.base_url, endpoint);
        let mut request = self.http.get(&url).query(params);
        request = match &self.auth {
            Auth::None => request,
            Auth::Header { name, value } => request.header(name.as_str(), value.as_str()),
            Auth::Query { name, value } => request.query(&[(name.as_str(), value.as_str())]),
        };

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            let body = response.text().await?;
            return serde_json::from_str(&body).map_err(|e| SourceError::Decode(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let excerpt: String = body.chars().take(EXCERPT_CHARS).collect();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(SourceError::Transient { status: status.as_u16(), excerpt })
        } else {
            Err(SourceError::Fatal { status: status.as_u16(), excerpt })
        }
    }

    /// Retries transient failures of the same request with a backoff.
    pub async fn call_with_retry(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        policy: &RetryPolicy,
    ) -> Result<Value, SourceError> {
        let mut attempt = 0;
        loop {
            match self.call(endpoint, params).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < policy.max_retries => {
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        endpoint,
                        e,
                        attempt + 1,
                        policy.max_retries,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
