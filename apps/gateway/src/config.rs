//! Application configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use quorum_infra::RateLimitConfig;

use crate::middleware::rate_limit::FailurePolicy;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Base URL of the polling API that allowed requests are forwarded to.
    pub upstream_url: String,
    pub upstream_timeout: Duration,
    /// What rate limited routes do when the counting store is unreachable.
    pub on_store_failure: FailurePolicy,
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let fail_open = env::var("RATE_LIMIT_FAIL_OPEN")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            upstream_url: env::var("UPSTREAM_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://127.0.0.1:3000".to_string()),
            upstream_timeout: Duration::from_secs(
                env::var("UPSTREAM_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            on_store_failure: if fail_open {
                FailurePolicy::Open
            } else {
                FailurePolicy::Closed
            },
            rate_limit: RateLimitConfig::from_env(),
        }
    }
}
