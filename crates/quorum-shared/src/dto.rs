//! Data Transfer Objects - request/response types for the API.

use serde::{Deserialize, Serialize};

/// Gateway health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    /// Name of the counting store backing the rate limiter.
    pub rate_limit_store: String,
}
