//! Error types for BillRelay

use thiserror::Error;

/// Result type alias using BillRelay's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for BillRelay operations
#[derive(Error, Debug)]
pub enum Error {
    /// Spreadsheet store error
    #[error("Store error: {0}")]
    Store(String),

    /// Billing provider error
    #[error("Billing provider error: {0}")]
    Billing(String),

    /// Service account authentication error
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Chat transport error
    #[error("Telegram error: {0}")]
    Telegram(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a billing error
    pub fn billing(msg: impl Into<String>) -> Self {
        Self::Billing(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<teloxide::RequestError> for Error {
    fn from(err: teloxide::RequestError) -> Self {
        Self::Telegram(err.to_string())
    }
}
