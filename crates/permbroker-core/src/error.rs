//! Error types for `permbroker` core library.

use thiserror::Error;

/// Result type alias using `permbroker` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `permbroker` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Request artifact could not be interpreted
    #[error("Malformed permission request: {0}")]
    MalformedRequest(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
