//! Domain-level error types.

use thiserror::Error;

use crate::ports::StoreError;

/// Errors returned by [`RateLimiter::check`](crate::RateLimiter::check).
///
/// Callers branch on the variant, never on the message: only
/// [`RateLimitError::Exceeded`] maps to `429 Too Many Requests`.
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded")]
    Exceeded { limit: u64, count: u64 },

    #[error("Rate limit store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Invalid rate limit token: {0}")]
    InvalidToken(String),
}

impl RateLimitError {
    /// True when the caller went over its budget for the current window.
    pub fn is_exceeded(&self) -> bool {
        matches!(self, Self::Exceeded { .. })
    }

    /// True when the counting backend failed; a server fault, not a client one.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}
