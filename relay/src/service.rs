use crate::dispatch::{Dispatcher, RelayMode, RelayRequest};
use crate::errors::RelayError;
use crate::fetch::ScrapedoOptions;
use crate::query::InventoryFilters;
use crate::utils::{ServiceBody, error_response, full_body, json_response};
use http::StatusCode;
use http::header::CONTENT_TYPE;
use hyper::body::Incoming;
use hyper::service::Service;
use hyper::{Method, Request, Response};
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Default per-attempt timeout for the scrape.do diagnostics probe.
const DIAG_SD_TIMEOUT: Duration = Duration::from_secs(15);

pub struct RelayService {
    dispatcher: Arc<Dispatcher>,
}

impl RelayService {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

impl Service<Request<Incoming>> for RelayService {
    type Response = Response<ServiceBody>;
    type Error = RelayError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let dispatcher = self.dispatcher.clone();

        Box::pin(async move {
            if req.method() != Method::GET {
                return error_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
            }

            let params = query_pairs(req.uri().query());
            match req.uri().path() {
                "/inv" => handle_inv(&dispatcher, &params).await,
                "/diag/direct" => json_response(StatusCode::OK, &dispatcher.probe_direct().await),
                "/diag/sd" => handle_diag_sd(&dispatcher, &params).await,
                "/health" => json_response(
                    StatusCode::OK,
                    &json!({"ok": true, "has_token": dispatcher.has_token()}),
                ),
                "/" => json_response(
                    StatusCode::OK,
                    &json!({
                        "ok": true,
                        "endpoints": ["/health", "/inv", "/diag/direct", "/diag/sd"],
                    }),
                ),
                _ => error_response(StatusCode::NOT_FOUND, "not found"),
            }
        })
    }
}

async fn handle_inv(
    dispatcher: &Dispatcher,
    params: &HashMap<String, String>,
) -> Result<Response<ServiceBody>, RelayError> {
    let filters = parse_filters(params);
    let request = parse_relay_request(dispatcher, params);

    let url = dispatcher.build_url(&filters)?;
    let outcome = dispatcher.relay(&url, &request).await;

    tracing::info!(
        source = outcome.source.as_str(),
        status = outcome.status.as_u16(),
        len = outcome.body.len(),
        "relayed inventory request"
    );

    Ok(Response::builder()
        .status(outcome.status)
        .header(CONTENT_TYPE, "application/json")
        .header("x-proxy-source", outcome.source.as_str())
        .body(full_body(outcome.body))?)
}

async fn handle_diag_sd(
    dispatcher: &Dispatcher,
    params: &HashMap<String, String>,
) -> Result<Response<ServiceBody>, RelayError> {
    let Some(target) = params.get("url").filter(|u| !u.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "missing required parameter: url");
    };

    let opts = ScrapedoOptions {
        timeout: parse_secs(params, "timeout").unwrap_or(DIAG_SD_TIMEOUT),
        render: parse_bool(params, "render", false),
        super_gateway: parse_bool(params, "super_gw", false),
        geo_code: non_empty(params, "geocode"),
    };
    json_response(StatusCode::OK, &dispatcher.probe_scrapedo(target, &opts).await)
}

fn parse_filters(params: &HashMap<String, String>) -> InventoryFilters {
    let mut filters = InventoryFilters::default();
    if let Some(model) = non_empty(params, "model") {
        filters.model = model;
    }
    if let Some(market) = non_empty(params, "market") {
        filters.market = market;
    }
    if let Some(language) = non_empty(params, "language") {
        filters.language = language;
    }
    if let Some(offset) = parse_u64(params, "offset") {
        filters.offset = offset;
    }
    if let Some(count) = parse_u64(params, "count") {
        filters.count = count;
    }
    filters.outside_search = parse_bool(params, "outsideSearch", filters.outside_search);
    filters
}

fn parse_relay_request(dispatcher: &Dispatcher, params: &HashMap<String, String>) -> RelayRequest {
    RelayRequest {
        mode: params
            .get("mode")
            .map(String::as_str)
            .map(RelayMode::parse)
            .unwrap_or_default(),
        direct_timeout: parse_secs(params, "direct_timeout")
            .unwrap_or_else(|| dispatcher.direct_timeout()),
        scrapedo: ScrapedoOptions {
            timeout: parse_secs(params, "sd_timeout")
                .unwrap_or_else(|| dispatcher.scrapedo_timeout()),
            render: parse_bool(params, "sd_render", false),
            super_gateway: parse_bool(params, "sd_super", false),
            geo_code: non_empty(params, "sd_geocode"),
        },
    }
}

fn query_pairs(query: Option<&str>) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.unwrap_or("").as_bytes())
        .into_owned()
        .collect()
}

fn non_empty(params: &HashMap<String, String>, key: &str) -> Option<String> {
    params.get(key).filter(|v| !v.is_empty()).cloned()
}

fn parse_u64(params: &HashMap<String, String>, key: &str) -> Option<u64> {
    params.get(key).and_then(|v| v.parse().ok())
}

fn parse_secs(params: &HashMap<String, String>, key: &str) -> Option<Duration> {
    parse_u64(params, key).map(Duration::from_secs)
}

/// Lenient boolean parsing; anything unrecognized keeps the default.
fn parse_bool(params: &HashMap<String, String>, key: &str, default: bool) -> bool {
    match params.get(key).map(|v| v.to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "true" | "1" | "yes") => true,
        Some(v) if matches!(v.as_str(), "false" | "0" | "no") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;
    use crate::testutils::{spawn_upstream, test_upstream_config};
    use serde_json::Value;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn spawn_relay(upstream: UpstreamConfig, token: Option<&str>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let dispatcher = Arc::new(Dispatcher::new(&upstream, token.map(str::to_string)));
        let service = RelayService::new(dispatcher);
        tokio::spawn(async move {
            let _ = crate::http::serve(listener, service).await;
        });
        addr
    }

    fn unreachable_config() -> UpstreamConfig {
        let dead: SocketAddr = "127.0.0.1:9".parse().unwrap();
        test_upstream_config(dead, dead)
    }

    #[tokio::test]
    async fn test_health_reports_token_presence() {
        let relay = spawn_relay(unreachable_config(), None).await;
        let body: Value = reqwest::get(format!("http://{relay}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, serde_json::json!({"ok": true, "has_token": false}));
    }

    #[tokio::test]
    async fn test_root_lists_endpoints() {
        let relay = spawn_relay(unreachable_config(), Some("t")).await;
        let body: Value = reqwest::get(format!("http://{relay}/"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["ok"], true);
        assert_eq!(
            body["endpoints"],
            serde_json::json!(["/health", "/inv", "/diag/direct", "/diag/sd"])
        );
    }

    #[tokio::test]
    async fn test_inv_relays_direct_response() {
        let upstream = spawn_upstream(StatusCode::OK, b"[1,2]").await;
        let relay = spawn_relay(test_upstream_config(upstream.addr, upstream.addr), None).await;

        let response = reqwest::get(format!(
            "http://{relay}/inv?mode=direct&model=m3&market=DE&language=de&count=5"
        ))
        .await
        .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(
            response.headers().get("x-proxy-source").unwrap(),
            "direct"
        );
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
        assert_eq!(response.bytes().await.unwrap().as_ref(), b"[1,2]");

        // The upstream saw the built query, filters included.
        let seen = upstream.requests.lock().unwrap();
        assert!(seen[0].contains("%22model%22%3A%22m3%22"));
        assert!(seen[0].contains("%22count%22%3A5"));
    }

    #[tokio::test]
    async fn test_inv_non_200_status_passes_through() {
        let upstream = spawn_upstream(StatusCode::FORBIDDEN, b"denied").await;
        let relay = spawn_relay(test_upstream_config(upstream.addr, upstream.addr), None).await;

        let response = reqwest::get(format!("http://{relay}/inv?mode=direct"))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
        assert_eq!(response.bytes().await.unwrap().as_ref(), b"denied");
    }

    #[tokio::test]
    async fn test_inv_auto_without_token_degrades_to_502() {
        let upstream = spawn_upstream(StatusCode::FORBIDDEN, b"blocked").await;
        let relay = spawn_relay(test_upstream_config(upstream.addr, upstream.addr), None).await;

        let response = reqwest::get(format!("http://{relay}/inv"))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.headers().get("x-proxy-source").unwrap(),
            "scrapedo"
        );
        assert_eq!(
            response.bytes().await.unwrap().as_ref(),
            br#"{"error":"SCRAPE_DO_TOKEN not set"}"#
        );
    }

    #[tokio::test]
    async fn test_diag_sd_requires_url() {
        let relay = spawn_relay(unreachable_config(), Some("t")).await;
        let response = reqwest::get(format!("http://{relay}/diag/sd"))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "missing required parameter: url");
    }

    #[tokio::test]
    async fn test_diag_sd_without_token() {
        let relay = spawn_relay(unreachable_config(), None).await;
        let response = reqwest::get(format!("http://{relay}/diag/sd?url=http://example.com/"))
            .await
            .unwrap();
        // No HTTP status override for the token-missing diag case.
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, serde_json::json!({"error": "SCRAPE_DO_TOKEN not set"}));
    }

    #[tokio::test]
    async fn test_diag_direct_shape() {
        let upstream = spawn_upstream(StatusCode::OK, b"inventory").await;
        let relay = spawn_relay(test_upstream_config(upstream.addr, upstream.addr), None).await;

        let body: Value = reqwest::get(format!("http://{relay}/diag/direct"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["stage"], "direct");
        assert_eq!(body["status"], 200);
        assert_eq!(body["len"], 9);
        assert!(body["elapsed_s"].as_f64().is_some());
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let relay = spawn_relay(unreachable_config(), None).await;
        let response = reqwest::get(format!("http://{relay}/nope"))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_non_get_rejected() {
        let relay = spawn_relay(unreachable_config(), None).await;
        let response = reqwest::Client::new()
            .post(format!("http://{relay}/inv"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_mode_parse_case_insensitive() {
        assert_eq!(RelayMode::parse("DIRECT"), RelayMode::Direct);
        assert_eq!(RelayMode::parse("SdOnly"), RelayMode::SdOnly);
        assert_eq!(RelayMode::parse("auto"), RelayMode::Auto);
        assert_eq!(RelayMode::parse("bogus"), RelayMode::Auto);
    }

    #[test]
    fn test_parse_bool_variants() {
        let mut params = HashMap::new();
        params.insert("flag".to_string(), "YES".to_string());
        assert!(parse_bool(&params, "flag", false));
        params.insert("flag".to_string(), "0".to_string());
        assert!(!parse_bool(&params, "flag", true));
        params.insert("flag".to_string(), "maybe".to_string());
        assert!(parse_bool(&params, "flag", true));
        assert!(!parse_bool(&params, "missing", false));
    }
}
