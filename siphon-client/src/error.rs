//! Error types for the Siphon client

use serde::Deserialize;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when using the Siphon client
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Hub returned an error status code
    #[error("Hub error (status {status}, {kind}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error kind reported by the hub (e.g. "refractory", "lack_agent")
        kind: String,
        /// Error message from the hub
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

/// Error body returned by the hub
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    kind: String,
}

impl ClientError {
    /// Create an API error from status code and raw body
    ///
    /// Falls back to the raw text when the body is not the hub's JSON error shape.
    pub fn api_error(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => Self::ApiError {
                status,
                kind: parsed.kind,
                message: parsed.error,
            },
            Err(_) => Self::ApiError {
                status,
                kind: String::new(),
                message: body,
            },
        }
    }

    /// Error kind reported by the hub, if any
    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::ApiError { kind, .. } if !kind.is_empty() => Some(kind),
            _ => None,
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }

    /// Check if the hub declined the run as a duplicate or during cool-down
    pub fn is_declined(&self) -> bool {
        matches!(self, Self::ApiError { status: 429, .. })
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }
}
