//! Store selection and limiter construction from configuration.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use quorum_core::ports::{Clock, RateLimitStore, SystemClock};
use quorum_core::{DEFAULT_INTERVAL, RateLimiter};

use super::{InMemoryRateStore, UnavailableStore};
use crate::database::DatabaseConfig;

#[cfg(feature = "redis")]
use super::RedisConfig;

/// Which counting backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// Process-local; limits are per instance.
    Memory,
    /// Shared `rate_limits` table.
    #[default]
    Postgres,
    Redis,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "redis" => Ok(Self::Redis),
            other => Err(format!("unknown rate limit backend '{}'", other)),
        }
    }
}

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Window length.
    pub interval: Duration,
    pub backend: StoreBackend,
    /// Required by the Postgres backend.
    pub database: Option<DatabaseConfig>,
    #[cfg(feature = "redis")]
    pub redis: RedisConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            backend: StoreBackend::default(),
            database: None,
            #[cfg(feature = "redis")]
            redis: RedisConfig::default(),
        }
    }
}

impl RateLimitConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let backend = match std::env::var("RATE_LIMIT_BACKEND") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!("{}, falling back to postgres", e);
                StoreBackend::Postgres
            }),
            Err(_) => StoreBackend::default(),
        };

        Self {
            interval: parse_interval(std::env::var("RATE_LIMIT_INTERVAL_MS").ok().as_deref()),
            backend,
            database: DatabaseConfig::from_env(),
            #[cfg(feature = "redis")]
            redis: RedisConfig::from_env(),
        }
    }
}

/// Window length from a raw `RATE_LIMIT_INTERVAL_MS` value.
///
/// Zero or unparseable values fall back to [`DEFAULT_INTERVAL`].
fn parse_interval(raw: Option<&str>) -> Duration {
    let Some(raw) = raw else {
        return DEFAULT_INTERVAL;
    };

    match raw.trim().parse::<u64>() {
        Ok(0) => {
            tracing::warn!("RATE_LIMIT_INTERVAL_MS is 0, using {:?}", DEFAULT_INTERVAL);
            DEFAULT_INTERVAL
        }
        Ok(ms) => Duration::from_millis(ms),
        Err(e) => {
            tracing::warn!(value = %raw, error = %e, "Invalid RATE_LIMIT_INTERVAL_MS, using {:?}", DEFAULT_INTERVAL);
            DEFAULT_INTERVAL
        }
    }
}

/// Build the configured counting store.
///
/// Never fails: when the backend cannot be set up the returned store rejects
/// every call, so requests fail with `StoreUnavailable` rather than being
/// silently allowed.
pub async fn build_store(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Arc<dyn RateLimitStore> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory rate limit store - limits are per instance");
            Arc::new(InMemoryRateStore::with_clock(clock))
        }
        StoreBackend::Postgres => postgres_store(config, clock).await,
        StoreBackend::Redis => redis_store(config, clock).await,
    }
}

#[cfg(feature = "postgres")]
async fn postgres_store(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Arc<dyn RateLimitStore> {
    let Some(database) = config.database.as_ref() else {
        tracing::error!("DATABASE_URL not set - rate limited routes will fail closed");
        return Arc::new(UnavailableStore::new("DATABASE_URL is not set"));
    };

    match super::PostgresRateStore::connect(database, clock).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect rate limit database");
            Arc::new(UnavailableStore::new(e.to_string()))
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn postgres_store(_config: &RateLimitConfig, _clock: Arc<dyn Clock>) -> Arc<dyn RateLimitStore> {
    tracing::error!("Postgres rate limit store requested but the postgres feature is disabled");
    Arc::new(UnavailableStore::new("built without postgres support"))
}

#[cfg(feature = "redis")]
async fn redis_store(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Arc<dyn RateLimitStore> {
    match super::RedisRateStore::with_clock(config.redis.clone(), clock).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect Redis rate limit store");
            Arc::new(UnavailableStore::new(e.to_string()))
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn redis_store(_config: &RateLimitConfig, _clock: Arc<dyn Clock>) -> Arc<dyn RateLimitStore> {
    tracing::error!("Redis rate limit store requested but the redis feature is disabled");
    Arc::new(UnavailableStore::new("built without redis support"))
}

/// Options for constructing a [`RateLimiter`].
///
/// Anything left unset comes from the environment: the interval from
/// `RATE_LIMIT_INTERVAL_MS`, the store from [`RateLimitConfig::from_env`].
#[derive(Default, Clone)]
pub struct RateLimiterOptions {
    pub interval: Option<Duration>,
    pub store: Option<Arc<dyn RateLimitStore>>,
}

impl RateLimiterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn store(mut self, store: Arc<dyn RateLimitStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn build(self) -> RateLimiter {
        match self.store {
            Some(store) => RateLimiter::new(store, self.interval.unwrap_or(DEFAULT_INTERVAL)),
            None => {
                let config = RateLimitConfig::from_env();
                let store = build_store(&config, Arc::new(SystemClock)).await;
                RateLimiter::new(store, self.interval.unwrap_or(config.interval))
            }
        }
    }
}
