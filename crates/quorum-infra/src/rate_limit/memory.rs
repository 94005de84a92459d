//! In-memory counting store - process-local fixed windows.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use quorum_core::domain::RateWindow;
use quorum_core::ports::{Clock, RateLimitStore, StoreError, SystemClock};

/// In-memory counting store using a HashMap behind an async Mutex.
///
/// Each increment runs entirely under one lock acquisition.
/// Note: Counts live in this process only, so limits are not shared
/// across instances. Use the Postgres or Redis store for that.
pub struct InMemoryRateStore {
    windows: Mutex<HashMap<String, RateWindow>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRateStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Snapshot of the window tracked for `token`, stale or not.
    pub async fn window(&self, token: &str) -> Option<RateWindow> {
        self.windows.lock().await.get(token).cloned()
    }
}

impl Default for InMemoryRateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateStore {
    async fn increment(&self, token: &str, interval: Duration) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let mut windows = self.windows.lock().await;

        let count = match windows.get_mut(token) {
            Some(window) => window.hit(now, interval),
            None => {
                windows.insert(token.to_string(), RateWindow::open(token, now, interval));
                1
            }
        };

        Ok(count)
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let mut windows = self.windows.lock().await;

        let before = windows.len();
        windows.retain(|_, window| window.is_current(now));
        let purged = (before - windows.len()) as u64;

        if purged > 0 {
            tracing::debug!(purged, "Purged expired in-memory rate windows");
        }
        Ok(purged)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use quorum_core::ports::ManualClock;
    use quorum_core::{RateLimitError, RateLimiter};

    const INTERVAL: Duration = Duration::from_millis(1000);

    fn store_with_clock() -> (Arc<ManualClock>, InMemoryRateStore) {
        let clock = Arc::new(ManualClock::default());
        let store = InMemoryRateStore::with_clock(clock.clone());
        (clock, store)
    }

    #[tokio::test]
    async fn test_nth_call_returns_n() {
        let (_clock, store) = store_with_clock();
        for expected in 1..=25 {
            assert_eq!(store.increment("t", INTERVAL).await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_expired_window_resets() {
        let (clock, store) = store_with_clock();
        for _ in 0..7 {
            store.increment("t", INTERVAL).await.unwrap();
        }

        clock.advance(Duration::from_millis(1500));
        assert_eq!(store.increment("t", INTERVAL).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expiry_boundary() {
        let (clock, store) = store_with_clock();
        store.increment("t", INTERVAL).await.unwrap();
        let expires_at = store.window("t").await.unwrap().expires_at;

        clock.set(expires_at - TimeDelta::milliseconds(1));
        assert_eq!(store.increment("t", INTERVAL).await.unwrap(), 2);

        clock.set(expires_at);
        assert_eq!(store.increment("t", INTERVAL).await.unwrap(), 1);

        let fresh = store.window("t").await.unwrap();
        assert_eq!(fresh.expires_at, expires_at + TimeDelta::milliseconds(1000));
    }

    #[tokio::test]
    async fn test_tokens_do_not_interfere() {
        let (_clock, store) = store_with_clock();
        store.increment("x", INTERVAL).await.unwrap();
        store.increment("x", INTERVAL).await.unwrap();

        assert_eq!(store.increment("y", INTERVAL).await.unwrap(), 1);
        assert_eq!(store.increment("x", INTERVAL).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_serialized() {
        let store = Arc::new(InMemoryRateStore::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.increment("hot", Duration::from_secs(60)).await.unwrap()
            }));
        }

        let mut counts = Vec::new();
        for handle in handles {
            counts.push(handle.await.unwrap());
        }
        counts.sort_unstable();
        assert_eq!(counts, (1..=50).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_purge_drops_only_stale_windows() {
        let (clock, store) = store_with_clock();
        store.increment("old", INTERVAL).await.unwrap();
        clock.advance(Duration::from_millis(800));
        store.increment("new", INTERVAL).await.unwrap();
        clock.advance(Duration::from_millis(300));

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.window("old").await.is_none());
        assert!(store.window("new").await.is_some());
    }

    #[tokio::test]
    async fn test_limiter_scenario_over_memory_store() {
        let (clock, store) = store_with_clock();
        let limiter = RateLimiter::new(Arc::new(store), INTERVAL);

        for _ in 0..3 {
            limiter.check(3, "t").await.unwrap();
        }
        assert!(matches!(
            limiter.check(3, "t").await,
            Err(RateLimitError::Exceeded { count: 4, .. })
        ));

        clock.advance(INTERVAL);
        assert_eq!(limiter.check(3, "t").await.unwrap().count, 1);
    }
}
