use serde::{Deserialize, Serialize};

/// Errors raised by a single call against the remote API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum FetchError {
    #[error("Rate limited by the remote API (HTTP 429)")]
    RateLimited,

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Malformed response: {message}")]
    Decode { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },
}

impl FetchError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited)
    }

    /// Worth retrying with backoff: connection trouble or a server-side failure
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network { .. } => true,
            FetchError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Failures that condemn one call (and so one list) without saying anything
    /// about the rest of the run. Malformed payloads are not in this class.
    pub fn is_fatal_for_leaf(&self) -> bool {
        !matches!(self, FetchError::Decode { .. })
    }
}
