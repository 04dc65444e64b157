//! Error types for the Paperless SMTP bridge.

use reqwest::StatusCode;

/// Top-level error type for the bridge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable(s): {}. {help}", missing.join(", "))]
    Missing { missing: Vec<String>, help: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors talking to the document-store backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{operation} failed with status {status}: {body}")]
    Status {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("Invalid response from backend: {0}")]
    Decode(String),
}

impl BackendError {
    /// HTTP status of a rejected request, if the backend answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status(),
            Self::Decode(_) => None,
        }
    }
}

/// Tag cache errors.
///
/// Only refresh failures surface here; creation failures are logged and
/// swallowed by the cache itself.
#[derive(Debug, thiserror::Error)]
pub enum TagCacheError {
    #[error("Failed to refresh tag mappings: {0}")]
    Refresh(#[source] BackendError),
}

/// SMTP front-end errors.
#[derive(Debug, thiserror::Error)]
pub enum SmtpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command line exceeds {max} bytes")]
    LineTooLong { max: usize },

    #[error("Connection closed by peer")]
    ConnectionClosed,
}

/// Message pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Message could not be parsed")]
    Unparseable,

    #[error("Message intake stopped: {0}")]
    Fatal(#[from] TagCacheError),
}

impl PipelineError {
    /// Whether the error must stop the server from accepting further mail.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Result type alias for the bridge.
pub type Result<T> = std::result::Result<T, Error>;
