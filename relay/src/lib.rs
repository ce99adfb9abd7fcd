pub mod config;
pub mod dispatch;
pub mod errors;
pub mod fetch;
mod http;
pub mod metrics_defs;
pub mod query;
pub mod service;
mod utils;

#[cfg(test)]
mod testutils;

pub use errors::RelayError;

use std::sync::Arc;
use tokio::net::TcpListener;

/// Binds the configured listener and serves relay requests until the task
/// is dropped. The scrape.do credential is injected once here; its absence
/// degrades the fallback path instead of failing startup.
pub async fn run(config: config::Config, token: Option<String>) -> Result<(), RelayError> {
    let dispatcher = Arc::new(dispatch::Dispatcher::new(&config.upstream, token));
    let service = service::RelayService::new(dispatcher.clone());

    let listener =
        TcpListener::bind(format!("{}:{}", config.listener.host, config.listener.port)).await?;
    tracing::info!(
        host = %config.listener.host,
        port = config.listener.port,
        has_token = dispatcher.has_token(),
        "inventory relay listening"
    );
    http::serve(listener, service).await
}
