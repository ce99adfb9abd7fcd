use clap::Parser;
use metrics_exporter_statsd::StatsdBuilder;
use relay::metrics_defs::{MetricDef, MetricType};
use std::error::Error;
use std::path::PathBuf;

mod config;

#[derive(Parser)]
#[command(name = "invgate", about = "Vehicle inventory relay with scrape.do fallback")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = config::Config::from_file(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Sentry must be initialized before the async runtime starts.
    let _sentry_guard = config.common.logging.as_ref().map(|logging| {
        sentry::init((
            logging.sentry_dsn.clone(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    if let Some(metrics_config) = &config.common.metrics {
        install_statsd_recorder(metrics_config)?;
    }

    let token = std::env::var("SCRAPE_DO_TOKEN")
        .ok()
        .filter(|t| !t.is_empty());
    if token.is_none() {
        tracing::warn!("SCRAPE_DO_TOKEN not set; scrape.do fallback will answer 502");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(relay::run(config.relay, token))?;

    Ok(())
}

fn install_statsd_recorder(config: &config::MetricsConfig) -> Result<(), Box<dyn Error>> {
    let recorder =
        StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port).build(Some("invgate"))?;
    metrics::set_global_recorder(recorder)?;

    for def in relay::metrics_defs::ALL_METRICS {
        describe_metric(def);
    }
    Ok(())
}

fn describe_metric(def: &MetricDef) {
    match def.metric_type {
        MetricType::Counter => metrics::describe_counter!(def.name, def.description),
        MetricType::Histogram => metrics::describe_histogram!(def.name, def.description),
    }
}
