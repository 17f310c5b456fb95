//! Error types for `thermite` core library.

use thiserror::Error;

/// Result type alias using `thermite` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `thermite` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML deserialization error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
