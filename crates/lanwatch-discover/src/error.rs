//! Error types for the lanwatch-discover crate.

use thiserror::Error;

use lanwatch_core::CoreError;
use lanwatch_store::StoreError;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Invalid {token}: {reason}")]
    Validation { token: String, reason: String },

    #[error("A scan is already running: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Probe of {ip} failed: {message}")]
    Probe { ip: String, message: String },

    #[error("External tool failed for {ip}: {message}")]
    ExternalTool { ip: String, message: String },

    #[error("Nmap not found at path: {path}")]
    NmapNotFound { path: String },

    #[error("Nmap exited with code {code}: {stderr}")]
    NmapFailed { code: i32, stderr: String },

    #[error("Failed to parse nmap XML output: {0}")]
    XmlParse(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Settings error: {0}")]
    Settings(#[from] CoreError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiscoverError {
    pub fn validation(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            token: token.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
