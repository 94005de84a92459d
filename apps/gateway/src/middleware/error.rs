//! Error handling middleware - RFC 7807 compliant responses.

use std::fmt;
use std::time::Duration;

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use quorum_core::RateLimitError;
use quorum_shared::ErrorResponse;

/// Application-level error type that converts to RFC 7807 responses.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    TooManyRequests { limit: u64, retry_after: Duration },
    StoreUnavailable(String),
    BadGateway(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::TooManyRequests { .. } => write!(f, "Rate limit exceeded"),
            AppError::StoreUnavailable(msg) => write!(f, "Rate limit store unavailable: {}", msg),
            AppError::BadGateway(msg) => write!(f, "Upstream error: {}", msg),
        }
    }
}

/// Whole seconds until a retry can succeed, never zero.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    let secs = if retry_after.subsec_nanos() > 0 { secs + 1 } else { secs };
    secs.max(1)
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        self.render(None)
    }
}

impl AppError {
    /// Problem details response, tagged with the request id when known.
    pub fn render(&self, request_id: Option<&str>) -> HttpResponse {
        let error = match self {
            AppError::BadRequest(detail) => ErrorResponse::bad_request(detail),
            AppError::TooManyRequests { retry_after, .. } => {
                ErrorResponse::too_many_requests(retry_after_secs(*retry_after))
            }
            AppError::StoreUnavailable(detail) => {
                tracing::error!("Rate limit store unavailable: {}", detail);
                ErrorResponse::service_unavailable("Rate limiting is temporarily unavailable.")
            }
            AppError::BadGateway(detail) => {
                tracing::error!("Upstream request failed: {}", detail);
                ErrorResponse::bad_gateway()
            }
        };
        let error = match request_id {
            Some(id) => error.with_request_id(id),
            None => error,
        };

        let mut response = HttpResponse::build(self.status_code());
        if let AppError::TooManyRequests { limit, retry_after } = self {
            response
                .insert_header(("Retry-After", retry_after_secs(*retry_after).to_string()))
                .insert_header(("X-RateLimit-Limit", limit.to_string()))
                .insert_header(("X-RateLimit-Remaining", "0"));
        }
        response.json(error)
    }

    /// Map a limiter failure to its outward response.
    ///
    /// `retry_after` is the limiter's window length, an upper bound on the
    /// time until the caller's window resets.
    pub fn from_rate_limit(err: RateLimitError, retry_after: Duration) -> Self {
        match err {
            RateLimitError::Exceeded { limit, .. } => AppError::TooManyRequests { limit, retry_after },
            RateLimitError::StoreUnavailable(e) => AppError::StoreUnavailable(e.to_string()),
            RateLimitError::InvalidToken(msg) => AppError::BadRequest(msg),
        }
    }
}

/// Result type alias for handlers.
pub type AppResult<T> = Result<T, AppError>;
