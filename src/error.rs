//! Unified error type for the sync core
//!
//! Errors are serializable so a presentation layer can forward them as-is,
//! and their messages are meant to be shown to the user.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum SmsError {
    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Other(String),
}

impl SmsError {
    /// Short machine-readable code, used by `ActionOutcome::Error`.
    pub fn code(&self) -> &'static str {
        match self {
            SmsError::Permission(_) => "permission",
            SmsError::Provider(_) => "provider",
            SmsError::Database(_) => "database",
            SmsError::Send(_) => "send",
            SmsError::Config(_) => "config",
            SmsError::InvalidInput(_) => "invalid_input",
            SmsError::Io(_) => "io",
            SmsError::Parse(_) => "parse",
            SmsError::Other(_) => "other",
        }
    }
}

impl From<std::io::Error> for SmsError {
    fn from(err: std::io::Error) -> Self {
        SmsError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for SmsError {
    fn from(err: toml::de::Error) -> Self {
        SmsError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SmsError {
    fn from(err: serde_json::Error) -> Self {
        SmsError::Parse(err.to_string())
    }
}

impl From<r2d2::Error> for SmsError {
    fn from(err: r2d2::Error) -> Self {
        SmsError::Database(err.to_string())
    }
}

impl From<rusqlite::Error> for SmsError {
    fn from(err: rusqlite::Error) -> Self {
        SmsError::Database(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SmsError {
    fn from(err: tokio::task::JoinError) -> Self {
        SmsError::Other(format!("Background task failed: {}", err))
    }
}

impl From<String> for SmsError {
    fn from(err: String) -> Self {
        SmsError::Other(err)
    }
}

impl From<&str> for SmsError {
    fn from(err: &str) -> Self {
        SmsError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SmsError>;
