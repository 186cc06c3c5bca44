//! API Error Handling
//!
//! Maps crawl errors onto HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use siphon_core::CrawlError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Crawl(CrawlError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Crawl(err) => {
                let status = StatusCode::from_u16(err.code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if status.is_server_error() {
                    tracing::error!(kind = err.kind(), "Crawl error: {}", err);
                } else {
                    tracing::debug!(kind = err.kind(), "Crawl error: {}", err);
                }
                (status, err.kind(), err.to_string())
            }
        };

        (
            status,
            Json(serde_json::json!({ "error": message, "kind": kind })),
        )
            .into_response()
    }
}

impl From<CrawlError> for ApiError {
    fn from(err: CrawlError) -> Self {
        ApiError::Crawl(err)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
