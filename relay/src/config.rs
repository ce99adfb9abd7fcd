use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,
}

/// Relay configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for incoming relay requests
    pub listener: Listener,
    /// Upstream endpoints and default timeouts
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Upstream endpoints and the default timeouts for both fetch stages.
/// Per-request query parameters can override the timeouts.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    #[serde(default = "default_inventory_endpoint")]
    pub inventory_endpoint: Url,
    #[serde(default = "default_scrapedo_endpoint")]
    pub scrapedo_endpoint: Url,
    #[serde(default = "default_direct_timeout_secs")]
    pub direct_timeout_secs: u64,
    #[serde(default = "default_scrapedo_timeout_secs")]
    pub scrapedo_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            inventory_endpoint: default_inventory_endpoint(),
            scrapedo_endpoint: default_scrapedo_endpoint(),
            direct_timeout_secs: default_direct_timeout_secs(),
            scrapedo_timeout_secs: default_scrapedo_timeout_secs(),
        }
    }
}

fn default_inventory_endpoint() -> Url {
    Url::parse("https://www.tesla.com/inventory/api/v1/inventory-results")
        .expect("static endpoint parses")
}

fn default_scrapedo_endpoint() -> Url {
    Url::parse("https://api.scrape.do/").expect("static endpoint parses")
}

fn default_direct_timeout_secs() -> u64 {
    15
}

fn default_scrapedo_timeout_secs() -> u64 {
    60
}
