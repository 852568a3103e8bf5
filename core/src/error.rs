//! Error types for the Prominis API client.
//!
//! # Design
//! Transport failures (`Timeout`, `Network`) carry no response. Every
//! non-2xx response is a protocol failure; 401 gets its own variant because
//! the facade reacts to it by dropping the session, and 404 because callers
//! frequently branch on "does not exist". Validation failures never appear
//! here: the validation runner returns them as data.

use thiserror::Error;

/// Message shown when the server supplied none.
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred";

/// Coarse classification used by callers that only care about the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No response: timeout or connection failure.
    Transport,
    /// A non-2xx response or an undecodable body.
    Protocol,
    /// A 401 response.
    Authentication,
    /// Raised locally before or instead of a network call.
    Local,
}

/// Errors returned by the facade, the parsers and the controllers.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,

    #[error("network failure: {0}")]
    Network(String),

    /// The server returned 401. The session has already been cleared.
    #[error("unauthorized: {}", .message.as_deref().unwrap_or("authentication required"))]
    Unauthorized { message: Option<String> },

    #[error("resource not found")]
    NotFound,

    /// Any other non-2xx status. `message` is the server's `message` field.
    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or(.body))]
    Http {
        status: u16,
        message: Option<String>,
        body: String,
    },

    #[error("deserialization failed: {0}")]
    Deserialization(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The owning controller was torn down before the call settled.
    #[error("request cancelled")]
    Cancelled,

    /// A file was rejected by the upload policy before any request was made.
    #[error("invalid file: {0}")]
    InvalidFile(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Timeout | ApiError::Network(_) => ErrorKind::Transport,
            ApiError::Unauthorized { .. } => ErrorKind::Authentication,
            ApiError::NotFound
            | ApiError::Http { .. }
            | ApiError::Deserialization(_) => ErrorKind::Protocol,
            ApiError::Serialization(_) | ApiError::Cancelled | ApiError::InvalidFile(_) => {
                ErrorKind::Local
            }
        }
    }

    /// The server-supplied reason, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized { message } | ApiError::Http { message, .. } => {
                message.as_deref()
            }
            _ => None,
        }
    }

    /// Human-readable text for a transient notification.
    pub fn display_message(&self) -> String {
        self.display_message_or(GENERIC_ERROR_MESSAGE)
    }

    /// Like `display_message`, with a caller-chosen fallback.
    pub fn display_message_or(&self, fallback: &str) -> String {
        match self {
            ApiError::InvalidFile(reason) => reason.clone(),
            other => other.server_message().unwrap_or(fallback).to_string(),
        }
    }
}

/// Errors raised while loading `ClientConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("failed to build HTTP transport: {0}")]
    Transport(String),
}
