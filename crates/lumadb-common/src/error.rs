//! Error types for LumaDB
//!
//! Errors raised while loading configuration or wiring up observability.
//! Query-time failures live in `lumadb-nosql`.

use thiserror::Error;

/// Result type alias using LumaDB's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the shared LumaDB utilities
#[derive(Error, Debug)]
pub enum Error {
    // Configuration Errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO Errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
