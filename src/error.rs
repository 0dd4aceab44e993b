//! Error taxonomy for calls against the license service.

use thiserror::Error;

/// Failure of a remote call, or of input validation that would have preceded one.
///
/// Errors are flattened to strings at construction so they can travel inside UI events
/// and be compared in tests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Rejected locally; no request was sent.
    #[error("{0}")]
    Validation(String),

    /// HTTP 401. Session handling belongs to the caller.
    #[error("authorization expired, sign in again")]
    AuthExpired,

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("not found: {detail}")]
    NotFound { detail: String },

    #[error("forbidden: {detail}")]
    Forbidden { detail: String },

    #[error("conflict: {detail}")]
    Conflict { detail: String },

    #[error("server error {status}: {detail}")]
    Server { status: u16, detail: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Map a non-success HTTP status plus the server's `detail` text.
    pub fn from_status(status: u16, detail: Option<String>) -> Self {
        let detail = detail.unwrap_or_else(|| {
            reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("unknown error")
                .to_string()
        });
        match status {
            401 => ApiError::AuthExpired,
            403 => ApiError::Forbidden { detail },
            404 => ApiError::NotFound { detail },
            408 | 504 => ApiError::Timeout,
            409 => ApiError::Conflict { detail },
            _ => ApiError::Server { status, detail },
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ApiError::Validation(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ApiError::from_status(status.as_u16(), None)
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}
