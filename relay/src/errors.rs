use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T, E = RelayError> = std::result::Result<T, E>;

/// Errors that can occur while handling a relay request
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to build response: {0}")]
    Http(#[from] http::Error),

    #[error("Failed to serialize body: {0}")]
    Serialization(#[from] serde_json::Error),
}
