//! Application state - shared across all handlers.

use std::time::Duration;

use quorum_core::RateLimiter;

/// Upstream polling API that allowed requests are forwarded to.
#[derive(Clone)]
pub struct Upstream {
    pub client: reqwest::Client,
    pub base_url: String,
}

impl Upstream {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Absolute upstream URL for an incoming path and query.
    pub fn url_for(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path_and_query)
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub limiter: RateLimiter,
    pub upstream: Upstream,
}

impl AppState {
    pub fn new(limiter: RateLimiter, upstream: Upstream) -> Self {
        tracing::info!(
            store = limiter.store().name(),
            interval_ms = limiter.interval().as_millis() as u64,
            upstream = %upstream.base_url,
            "Application state initialized"
        );

        Self { limiter, upstream }
    }
}
