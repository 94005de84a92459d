//! Counting store port.

use async_trait::async_trait;
use std::time::Duration;

/// Counting store - abstraction over the backends that track per-token windows.
///
/// Implementations must make `increment` atomic per token: concurrent calls for
/// the same token behave as if applied in some serial order. A store that
/// cannot guarantee this only enforces an approximate limit.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Apply the fixed-window rule for `token` and return the new count.
    ///
    /// Opens a window with count 1 when none exists or the existing one has
    /// expired, otherwise increments the current one.
    async fn increment(&self, token: &str, interval: Duration) -> Result<u64, StoreError>;

    /// Drop stale windows. Returns how many were removed.
    ///
    /// Expiry is always decided by timestamp, so skipping this never affects
    /// correctness; stores with native expiry keep the default.
    async fn purge_expired(&self) -> Result<u64, StoreError> {
        Ok(0)
    }

    /// Short backend name for logs and health output.
    fn name(&self) -> &'static str;
}

/// Counting store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Store not configured: {0}")]
    NotConfigured(String),

    #[error("Unexpected store response: {0}")]
    Corrupt(String),
}
