//! Fixed-window rate limiter over a pluggable counting store.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::RateToken;
use crate::error::RateLimitError;
use crate::ports::RateLimitStore;

/// Window length used when none is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(60_000);

/// Shortest window a limiter will use. Windows are tracked in whole
/// milliseconds, so anything shorter would expire as it opens.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Outcome of an allowed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Count for the window after this request.
    pub count: u64,
    pub limit: u64,
    pub remaining: u64,
}

/// Enforces "at most `limit` requests per token per interval".
///
/// Holds no counting state of its own. Every limiter sharing a store shares
/// its counts, so two instances with the same token draw from one budget.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    interval: Duration,
}

impl RateLimiter {
    /// Intervals below [`MIN_INTERVAL`] are raised to it.
    pub fn new(store: Arc<dyn RateLimitStore>, interval: Duration) -> Self {
        Self {
            store,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    pub fn with_store(store: Arc<dyn RateLimitStore>) -> Self {
        Self::new(store, DEFAULT_INTERVAL)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn store(&self) -> &Arc<dyn RateLimitStore> {
        &self.store
    }

    /// Count one request for `token` and compare against `limit`.
    ///
    /// The counter is incremented even when the result is
    /// [`RateLimitError::Exceeded`], so a throttled client retrying at once
    /// keeps spending its budget. Store failures are returned as
    /// [`RateLimitError::StoreUnavailable`] without retrying.
    pub async fn check(&self, limit: u64, token: &str) -> Result<RateLimitStatus, RateLimitError> {
        let token = RateToken::new(token)?;
        self.check_token(limit, &token).await
    }

    /// Same as [`check`](Self::check) for an already validated token.
    pub async fn check_token(
        &self,
        limit: u64,
        token: &RateToken,
    ) -> Result<RateLimitStatus, RateLimitError> {
        let count = self.store.increment(token.as_str(), self.interval).await?;

        if count > limit {
            return Err(RateLimitError::Exceeded { limit, count });
        }

        Ok(RateLimitStatus {
            count,
            limit,
            remaining: limit - count,
        })
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("store", &self.store.name())
            .field("interval", &self.interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RateWindow;
    use crate::ports::{Clock, ManualClock, StoreError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// Minimal store for exercising the limiter against a manual clock.
    struct WindowStore {
        clock: Arc<ManualClock>,
        windows: Mutex<HashMap<String, RateWindow>>,
        calls: AtomicUsize,
    }

    impl WindowStore {
        fn new(clock: Arc<ManualClock>) -> Self {
            Self {
                clock,
                windows: Mutex::new(HashMap::new()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RateLimitStore for WindowStore {
        async fn increment(&self, token: &str, interval: Duration) -> Result<u64, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.clock.now();
            let mut windows = self.windows.lock().await;
            let window = windows
                .entry(token.to_string())
                .or_insert_with(|| RateWindow {
                    token: token.to_string(),
                    count: 0,
                    expires_at: now,
                });
            Ok(window.hit(now, interval))
        }

        fn name(&self) -> &'static str {
            "test"
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl RateLimitStore for BrokenStore {
        async fn increment(&self, _token: &str, _interval: Duration) -> Result<u64, StoreError> {
            Err(StoreError::Connection("connection refused".to_string()))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    fn setup(interval_ms: u64) -> (Arc<ManualClock>, Arc<WindowStore>, RateLimiter) {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(WindowStore::new(clock.clone()));
        let limiter = RateLimiter::new(store.clone(), Duration::from_millis(interval_ms));
        (clock, store, limiter)
    }

    #[tokio::test]
    async fn test_concrete_scenario() {
        let (clock, _store, limiter) = setup(1000);

        for expected in 1..=3 {
            let status = limiter.check(3, "t").await.unwrap();
            assert_eq!(status.count, expected);
        }

        let err = limiter.check(3, "t").await.unwrap_err();
        assert!(matches!(err, RateLimitError::Exceeded { limit: 3, count: 4 }));

        clock.advance(Duration::from_millis(1000));
        let status = limiter.check(3, "t").await.unwrap();
        assert_eq!(status.count, 1);
        assert_eq!(status.remaining, 2);
    }

    #[tokio::test]
    async fn test_threshold_boundary() {
        let (_clock, _store, limiter) = setup(60_000);

        for _ in 0..4 {
            limiter.check(5, "edge").await.unwrap();
        }
        // count == limit succeeds
        let status = limiter.check(5, "edge").await.unwrap();
        assert_eq!(status.count, 5);
        assert_eq!(status.remaining, 0);
        // count == limit + 1 fails
        let err = limiter.check(5, "edge").await.unwrap_err();
        assert!(err.is_exceeded());
    }

    #[tokio::test]
    async fn test_exceeding_calls_still_count() {
        let (_clock, _store, limiter) = setup(60_000);

        limiter.check(1, "retry").await.unwrap();
        for expected in 2..=4 {
            match limiter.check(1, "retry").await {
                Err(RateLimitError::Exceeded { count, .. }) => assert_eq!(count, expected),
                other => panic!("expected Exceeded, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_instances_share_one_budget() {
        let clock = Arc::new(ManualClock::default());
        let store: Arc<dyn RateLimitStore> = Arc::new(WindowStore::new(clock));
        let a = RateLimiter::new(store.clone(), Duration::from_millis(1000));
        let b = RateLimiter::new(store, Duration::from_millis(1000));

        a.check(3, "shared").await.unwrap();
        b.check(3, "shared").await.unwrap();
        a.check(3, "shared").await.unwrap();
        assert!(b.check(3, "shared").await.unwrap_err().is_exceeded());
    }

    #[tokio::test]
    async fn test_tokens_are_isolated() {
        let (_clock, _store, limiter) = setup(60_000);

        for _ in 0..3 {
            limiter.check(10, "x").await.unwrap();
        }
        assert_eq!(limiter.check(10, "y").await.unwrap().count, 1);
        assert_eq!(limiter.check(10, "x").await.unwrap().count, 4);
    }

    #[tokio::test]
    async fn test_invalid_token_skips_store() {
        let (_clock, store, limiter) = setup(60_000);

        let err = limiter.check(10, "  ").await.unwrap_err();
        assert!(matches!(err, RateLimitError::InvalidToken(_)));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_not_a_verdict() {
        let limiter = RateLimiter::with_store(Arc::new(BrokenStore));

        let err = limiter.check(10, "t").await.unwrap_err();
        assert!(err.is_store_unavailable());
        assert!(!err.is_exceeded());
    }

    #[tokio::test]
    async fn test_zero_limit_denies_everything() {
        let (_clock, _store, limiter) = setup(60_000);
        assert!(limiter.check(0, "t").await.unwrap_err().is_exceeded());
    }

    #[tokio::test]
    async fn test_zero_interval_still_limits() {
        let (_clock, _store, limiter) = setup(0);
        assert_eq!(limiter.interval(), MIN_INTERVAL);

        let mut allowed = 0;
        for _ in 0..100 {
            if limiter.check(1, "t").await.is_ok() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 1);
    }

    #[test]
    fn test_sub_millisecond_interval_is_raised() {
        let limiter = RateLimiter::new(Arc::new(BrokenStore), Duration::from_micros(300));
        assert_eq!(limiter.interval(), MIN_INTERVAL);
    }

    #[test]
    fn test_default_interval() {
        let limiter = RateLimiter::with_store(Arc::new(BrokenStore));
        assert_eq!(limiter.interval(), Duration::from_millis(60_000));
    }
}
