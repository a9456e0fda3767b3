//! Account page client errors.

use thiserror::Error;
use vsc_core::CoreError;

/// Errors from the account page client.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The token was rejected.
    #[error("authentication failed: {0}")]
    AuthError(String),

    /// Too many requests.
    #[error("rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Any other non-success response.
    #[error("account page error (HTTP {status}): {detail}")]
    ApiError { status: u16, detail: String },

    /// The body could not be decoded.
    #[error("failed to parse response: {0}")]
    ParseError(String),

    /// The body decoded but holds values this tool cannot use.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// The response carried no usable `Date` header.
    #[error("cannot determine server time: {0}")]
    ServerTime(String),

    /// Client construction failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SourceError {
    /// Whether retrying the request later could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Http(e) => e.is_timeout() || e.is_connect(),
            SourceError::RateLimited { .. } => true,
            SourceError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// HTTP status of the failed response, if there was one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            SourceError::NotFound(_) => Some(404),
            SourceError::AuthError(_) => Some(401),
            SourceError::RateLimited { .. } => Some(429),
            SourceError::ApiError { status, .. } => Some(*status),
            SourceError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<CoreError> for SourceError {
    fn from(err: CoreError) -> Self {
        SourceError::InvalidRecord(err.to_string())
    }
}

/// Result type for account page operations.
pub type SourceResult<T> = Result<T, SourceError>;
