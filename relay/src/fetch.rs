use crate::query::UPSTREAM_QUERY_SET;
use bytes::Bytes;
use http::StatusCode;
use http::header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, PRAGMA, USER_AGENT};
use percent_encoding::utf8_percent_encode;
use std::time::Duration;

/// A completed HTTP exchange from either strategy. Any status code counts;
/// a non-200 is a signal for the dispatcher, not an error here.
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Result of one fetch strategy, shared by both strategies so the
/// dispatcher can pattern-match instead of type-checking response objects.
#[derive(Debug)]
pub enum FetchOutcome {
    /// A completed exchange, whatever the status code.
    Response(RawResponse),
    /// The scrape.do credential is not configured.
    ConfigMissing,
    /// Connection-level failure (timeout, refused, reset), with detail.
    NetworkFailure(String),
}

/// Bounded retry policy for the scrape.do fetch path.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_backoff: Duration::from_secs(6),
        }
    }
}

impl RetryPolicy {
    /// Backoff slept after the given 1-based failed attempt: 2^attempt
    /// seconds, capped at `max_backoff`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_secs(2u64.saturating_pow(attempt)).min(self.max_backoff)
    }
}

/// Per-request options for the scrape.do path.
#[derive(Clone, Debug)]
pub struct ScrapedoOptions {
    pub timeout: Duration,
    pub render: bool,
    pub super_gateway: bool,
    pub geo_code: Option<String>,
}

impl Default for ScrapedoOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            render: false,
            super_gateway: false,
            geo_code: None,
        }
    }
}

/// Outbound HTTP client for both fetch strategies.
pub struct Fetcher {
    client: reqwest::Client,
    scrapedo_endpoint: String,
    token: Option<String>,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(scrapedo_endpoint: String, token: Option<String>, retry: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            scrapedo_endpoint,
            token,
            retry,
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// One direct exchange against the inventory upstream. The browser-like
    /// header set is part of the upstream contract.
    pub async fn direct_exchange(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<RawResponse, String> {
        let result = self
            .client
            .get(url)
            .timeout(timeout)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, "Mozilla/5.0")
            .header(ACCEPT_LANGUAGE, "tr-TR,tr;q=0.9,en-US;q=0.8")
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await;
        collect_exchange(result).await
    }

    /// Direct fetch strategy: one attempt, no retries at this layer.
    pub async fn fetch_direct(&self, url: &str, timeout: Duration) -> FetchOutcome {
        match self.direct_exchange(url, timeout).await {
            Ok(raw) => FetchOutcome::Response(raw),
            Err(detail) => FetchOutcome::NetworkFailure(detail),
        }
    }

    /// Proxy URL for a target, or `None` when no token is configured.
    pub fn scrapedo_api_url(&self, target: &str, opts: &ScrapedoOptions) -> Option<String> {
        let token = self.token.as_deref()?;
        Some(build_scrapedo_url(
            &self.scrapedo_endpoint,
            token,
            target,
            opts,
        ))
    }

    /// Same proxy URL with the token masked, for diagnostics output.
    pub fn scrapedo_display_url(&self, target: &str, opts: &ScrapedoOptions) -> Option<String> {
        self.token.as_ref()?;
        Some(build_scrapedo_url(
            &self.scrapedo_endpoint,
            "***",
            target,
            opts,
        ))
    }

    /// One exchange through the scrape.do API, no retries.
    pub async fn scrapedo_exchange(
        &self,
        api_url: &str,
        timeout: Duration,
    ) -> Result<RawResponse, String> {
        let result = self
            .client
            .get(api_url)
            .timeout(timeout)
            .header(ACCEPT, "application/json")
            .send()
            .await;
        collect_exchange(result).await
    }

    /// Fallback fetch strategy: short-circuits without a token, otherwise
    /// retries connection-level failures with capped exponential backoff.
    /// Non-200 responses are returned as-is without retry.
    pub async fn fetch_scrapedo(&self, target: &str, opts: &ScrapedoOptions) -> FetchOutcome {
        let Some(api_url) = self.scrapedo_api_url(target, opts) else {
            return FetchOutcome::ConfigMissing;
        };

        let mut last_failure = String::new();
        for attempt in 1..=self.retry.max_attempts {
            match self.scrapedo_exchange(&api_url, opts.timeout).await {
                Ok(raw) => return FetchOutcome::Response(raw),
                Err(detail) => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        backoff_s = delay.as_secs(),
                        error = %detail,
                        "scrape.do fetch failed"
                    );
                    last_failure = detail;
                    tokio::time::sleep(delay).await;
                }
            }
        }
        FetchOutcome::NetworkFailure(last_failure)
    }
}

fn build_scrapedo_url(
    endpoint: &str,
    token: &str,
    target: &str,
    opts: &ScrapedoOptions,
) -> String {
    let mut api = format!(
        "{endpoint}?token={token}&url={}",
        utf8_percent_encode(target, UPSTREAM_QUERY_SET)
    );
    if opts.render {
        api.push_str("&render=true");
    }
    if opts.super_gateway {
        api.push_str("&super=true");
    }
    if let Some(code) = &opts.geo_code {
        api.push_str("&geoCode=");
        api.extend(utf8_percent_encode(code, UPSTREAM_QUERY_SET));
    }
    api
}

/// Collects a reqwest result into a raw response. Only connection-level
/// failures (including body read failures) become errors.
async fn collect_exchange(
    result: Result<reqwest::Response, reqwest::Error>,
) -> Result<RawResponse, String> {
    let response = result.map_err(|e| e.to_string())?;
    let status = response.status();
    let body = response.bytes().await.map_err(|e| e.to_string())?;
    Ok(RawResponse { status, body })
}
