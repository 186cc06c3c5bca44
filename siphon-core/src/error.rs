//! Error taxonomy for connector runs

use std::time::Duration;
use thiserror::Error;

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Typed failures of a connector run
///
/// Every variant maps to a status code; codes in the fatal set (400, 422,
/// 500) abort the current sweep group, every other code is logged and the
/// sweep moves on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CrawlError {
    /// Caller parameters failed connector validation
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// No connector is registered under the requested id
    #[error("Connector not found: {0}")]
    NotFound(String),

    /// Transient network or parse failure
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The run identity is already running or cooling down
    #[error("Run already in progress or cooling down: {0}")]
    DuplicateRun(String),

    /// Remote delegation found no eligible agent
    #[error("No agent available for connector: {0}")]
    LackAgent(String),

    /// A fetch or remote round trip exceeded its budget
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Startup registered two connectors under one id
    #[error("Connector already registered: {0}")]
    DuplicateRegistration(String),

    /// Anything else
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl CrawlError {
    /// HTTP-style status code of this error
    pub fn code(&self) -> u16 {
        match self {
            CrawlError::InvalidParameters(_) => 422,
            CrawlError::NotFound(_) => 400,
            CrawlError::RequestFailed(_) => 502,
            CrawlError::DuplicateRun(_) => 429,
            CrawlError::LackAgent(_) => 503,
            CrawlError::Timeout(_) => 504,
            CrawlError::DuplicateRegistration(_) => 500,
            CrawlError::Unknown(_) => 500,
        }
    }

    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            CrawlError::InvalidParameters(_) => "invalid_parameters",
            CrawlError::NotFound(_) => "not_found",
            CrawlError::RequestFailed(_) => "request_failed",
            CrawlError::DuplicateRun(_) => "duplicate_run",
            CrawlError::LackAgent(_) => "lack_agent",
            CrawlError::Timeout(_) => "timeout",
            CrawlError::DuplicateRegistration(_) => "duplicate_registration",
            CrawlError::Unknown(_) => "unknown",
        }
    }

    /// Whether this error aborts a batch sweep group
    pub fn is_fatal(&self) -> bool {
        matches!(self.code(), 400 | 422 | 500)
    }

    /// Whether the error should be forwarded to the alert sink
    pub fn should_alert(&self) -> bool {
        !matches!(self, CrawlError::DuplicateRun(_) | CrawlError::Timeout(_))
    }

    /// Create a request failure from any displayable error
    pub fn request_failed(err: impl std::fmt::Display) -> Self {
        CrawlError::RequestFailed(err.to_string())
    }

    /// Create an unknown failure from any displayable error
    pub fn unknown(err: impl std::fmt::Display) -> Self {
        CrawlError::Unknown(err.to_string())
    }
}

impl From<serde_json::Error> for CrawlError {
    fn from(err: serde_json::Error) -> Self {
        CrawlError::RequestFailed(format!("Failed to parse JSON: {}", err))
    }
}
