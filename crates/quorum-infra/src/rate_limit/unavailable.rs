//! Counting store that refuses every call.

use std::time::Duration;

use async_trait::async_trait;

use quorum_core::ports::{RateLimitStore, StoreError};

/// Stands in for a durable store that could not be configured or reached.
///
/// Every increment fails with [`StoreError::NotConfigured`], so the limiter
/// reports `StoreUnavailable` on first use instead of guessing a verdict.
#[derive(Debug, Clone)]
pub struct UnavailableStore {
    reason: String,
}

impl UnavailableStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl RateLimitStore for UnavailableStore {
    async fn increment(&self, _token: &str, _interval: Duration) -> Result<u64, StoreError> {
        Err(StoreError::NotConfigured(self.reason.clone()))
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}
