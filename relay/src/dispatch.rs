use crate::config::UpstreamConfig;
use crate::fetch::{FetchOutcome, Fetcher, RetryPolicy, ScrapedoOptions};
use crate::metrics_defs;
use crate::query::{InventoryFilters, InventoryQuery, build_inventory_url};
use bytes::Bytes;
use http::StatusCode;
use serde_json::{Value, json};
use std::time::{Duration, Instant};

/// Fetch strategy selection, parsed case-insensitively from the `mode`
/// query parameter. Unknown values fall back to `Auto`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RelayMode {
    #[default]
    Auto,
    Direct,
    SdOnly,
}

impl RelayMode {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "direct" => RelayMode::Direct,
            "sdonly" => RelayMode::SdOnly,
            _ => RelayMode::Auto,
        }
    }
}

/// Which strategy produced the relayed response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelaySource {
    Direct,
    Scrapedo,
}

impl RelaySource {
    pub fn as_str(self) -> &'static str {
        match self {
            RelaySource::Direct => "direct",
            RelaySource::Scrapedo => "scrapedo",
        }
    }
}

/// What gets relayed back to the caller: status and body are passed through
/// from whichever upstream answered, never merged or mutated.
#[derive(Debug)]
pub struct RelayOutcome {
    pub source: RelaySource,
    pub status: StatusCode,
    pub body: Bytes,
}

/// Per-request dispatch parameters.
#[derive(Clone, Debug)]
pub struct RelayRequest {
    pub mode: RelayMode,
    pub direct_timeout: Duration,
    pub scrapedo: ScrapedoOptions,
}

const TOKEN_MISSING_BODY: &[u8] = br#"{"error":"SCRAPE_DO_TOKEN not set"}"#;

/// Orchestrates direct-vs-fallback fetch attempts. Stateless across
/// requests; the credential is injected once at construction.
pub struct Dispatcher {
    fetcher: Fetcher,
    inventory_endpoint: String,
    direct_timeout: Duration,
    scrapedo_timeout: Duration,
}

impl Dispatcher {
    pub fn new(upstream: &UpstreamConfig, token: Option<String>) -> Self {
        Self {
            fetcher: Fetcher::new(
                upstream.scrapedo_endpoint.to_string(),
                token,
                RetryPolicy::default(),
            ),
            inventory_endpoint: upstream.inventory_endpoint.to_string(),
            direct_timeout: Duration::from_secs(upstream.direct_timeout_secs),
            scrapedo_timeout: Duration::from_secs(upstream.scrapedo_timeout_secs),
        }
    }

    pub fn has_token(&self) -> bool {
        self.fetcher.has_token()
    }

    /// Configured default timeout for the direct stage.
    pub fn direct_timeout(&self) -> Duration {
        self.direct_timeout
    }

    /// Configured default per-attempt timeout for the scrape.do stage.
    pub fn scrapedo_timeout(&self) -> Duration {
        self.scrapedo_timeout
    }

    pub fn build_url(&self, filters: &InventoryFilters) -> Result<String, serde_json::Error> {
        build_inventory_url(&self.inventory_endpoint, &InventoryQuery::new(filters))
    }

    /// Runs the mode state machine for one built URL. Every code path
    /// produces a structured outcome; nothing is raised to the caller.
    pub async fn relay(&self, url: &str, request: &RelayRequest) -> RelayOutcome {
        let outcome = match request.mode {
            RelayMode::Direct => {
                let fetched = self.fetcher.fetch_direct(url, request.direct_timeout).await;
                settle(RelaySource::Direct, fetched)
            }
            RelayMode::SdOnly => {
                let fetched = self.fetcher.fetch_scrapedo(url, &request.scrapedo).await;
                settle(RelaySource::Scrapedo, fetched)
            }
            RelayMode::Auto => {
                match self.fetcher.fetch_direct(url, request.direct_timeout).await {
                    FetchOutcome::Response(raw) if raw.status == StatusCode::OK => {
                        settle(RelaySource::Direct, FetchOutcome::Response(raw))
                    }
                    FetchOutcome::Response(raw) => {
                        tracing::debug!(status = %raw.status, "direct returned non-200, falling back");
                        self.fallback(url, request).await
                    }
                    FetchOutcome::NetworkFailure(detail) => {
                        tracing::warn!(error = %detail, "direct fetch failed, falling back");
                        self.fallback(url, request).await
                    }
                    // Not produced by the direct path.
                    FetchOutcome::ConfigMissing => {
                        settle(RelaySource::Direct, FetchOutcome::ConfigMissing)
                    }
                }
            }
        };

        metrics::counter!(
            metrics_defs::RELAY_REQUESTS.name,
            "source" => outcome.source.as_str(),
            "status" => outcome.status.as_u16().to_string()
        )
        .increment(1);
        outcome
    }

    async fn fallback(&self, url: &str, request: &RelayRequest) -> RelayOutcome {
        metrics::counter!(metrics_defs::RELAY_FALLBACKS.name).increment(1);
        let fetched = self.fetcher.fetch_scrapedo(url, &request.scrapedo).await;
        settle(RelaySource::Scrapedo, fetched)
    }

    /// Diagnostics probe for the direct stage: timing and length metadata
    /// for the default query, never the payload itself.
    pub async fn probe_direct(&self) -> Value {
        let url = match self.build_url(&InventoryFilters::default()) {
            Ok(url) => url,
            Err(e) => return json!({"stage": "direct", "error": e.to_string()}),
        };
        let start = Instant::now();
        match self.fetcher.direct_exchange(&url, self.direct_timeout).await {
            Ok(raw) => json!({
                "stage": "direct",
                "status": raw.status.as_u16(),
                "elapsed_s": round2(start.elapsed()),
                "len": raw.body.len(),
            }),
            Err(detail) => json!({
                "stage": "direct",
                "error": detail,
                "elapsed_s": round2(start.elapsed()),
            }),
        }
    }

    /// Diagnostics probe for the scrape.do stage against a caller-supplied
    /// target URL. Measures a single attempt; the retry loop is a relay
    /// concern, not a probe concern.
    pub async fn probe_scrapedo(&self, target: &str, opts: &ScrapedoOptions) -> Value {
        let Some(api_url) = self.fetcher.scrapedo_api_url(target, opts) else {
            return json!({"error": "SCRAPE_DO_TOKEN not set"});
        };
        let display_url = self.fetcher.scrapedo_display_url(target, opts);

        let start = Instant::now();
        match self.fetcher.scrapedo_exchange(&api_url, opts.timeout).await {
            Ok(raw) => json!({
                "stage": "scrapedo",
                "target": target,
                "status": raw.status.as_u16(),
                "elapsed_s": round2(start.elapsed()),
                "len": raw.body.len(),
                "api": display_url,
            }),
            Err(detail) => json!({
                "stage": "scrapedo",
                "target": target,
                "error": detail,
                "elapsed_s": round2(start.elapsed()),
                "api": display_url,
            }),
        }
    }
}

/// Maps a fetch outcome to the relayed response. Completed exchanges pass
/// through untouched; the two failure shapes become fixed JSON bodies.
fn settle(source: RelaySource, outcome: FetchOutcome) -> RelayOutcome {
    match outcome {
        FetchOutcome::Response(raw) => RelayOutcome {
            source,
            status: raw.status,
            body: raw.body,
        },
        FetchOutcome::ConfigMissing => RelayOutcome {
            source,
            status: StatusCode::BAD_GATEWAY,
            body: Bytes::from_static(TOKEN_MISSING_BODY),
        },
        FetchOutcome::NetworkFailure(detail) => RelayOutcome {
            source,
            status: StatusCode::GATEWAY_TIMEOUT,
            body: Bytes::from(
                json!({"error": "proxy timeout", "detail": detail}).to_string(),
            ),
        },
    }
}

fn round2(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}
