//! dropmirror Remote - HTTP adapter for a cursor-based delta feed
//!
//! Provides an async client for:
//! - Paged delta pulls (`POST /delta`)
//! - Long-polling for changes past a cursor (`GET /longpoll_delta`)
//! - File content downloads (`GET /files/auto/<path>`)
//!
//! ## Modules
//!
//! - [`client`] - Authenticated HTTP client and endpoint construction
//! - [`delta`] - Wire types, response parsing, delta and long-poll calls
//! - [`provider`] - [`IDeltaFeed`](dropmirror_core::ports::IDeltaFeed) implementation

pub mod client;
pub mod delta;
pub mod provider;

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when talking to the delta feed service
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The access token is missing, invalid or revoked
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The request was malformed (bad cursor, bad parameters)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The requested path does not exist remotely
    #[error("Not found: {0}")]
    NotFound(String),

    /// The service asked us to slow down
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Duration to wait before retrying
        retry_after: Duration,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error ({status}): {message}")]
    ServerError {
        /// HTTP status code
        status: u16,
        /// Response body, if any
        message: String,
    },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Retry delay assumed when a throttling response carries no usable header
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

impl RemoteError {
    /// Classifies a non-success HTTP status
    ///
    /// `retry_after` is the raw `Retry-After` header value, if present.
    pub fn from_status(status: StatusCode, retry_after: Option<&str>, body: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized(body),
            StatusCode::BAD_REQUEST => Self::BadRequest(body),
            StatusCode::NOT_FOUND => Self::NotFound(body),
            StatusCode::TOO_MANY_REQUESTS => Self::TooManyRequests {
                retry_after: parse_retry_after(retry_after),
            },
            // Rate limiting is also signalled as 503 + Retry-After.
            StatusCode::SERVICE_UNAVAILABLE if retry_after.is_some() => Self::TooManyRequests {
                retry_after: parse_retry_after(retry_after),
            },
            s => Self::ServerError {
                status: s.as_u16(),
                message: body,
            },
        }
    }
}

/// Parses a `Retry-After` value given in whole seconds
fn parse_retry_after(value: Option<&str>) -> Duration {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}
