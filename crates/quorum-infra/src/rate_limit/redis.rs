//! Redis counting store using a fixed window per key.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};

use quorum_core::ports::{Clock, RateLimitStore, StoreError, SystemClock};

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Key prefix for rate limit keys
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            key_prefix: "ratelimit".to_string(),
        }
    }
}

impl RedisConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(
                std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            key_prefix: std::env::var("RATE_LIMIT_KEY_PREFIX")
                .unwrap_or_else(|_| "ratelimit".to_string()),
        }
    }
}

/// Reset-or-increment executed atomically by Redis.
///
/// KEYS[1] window hash, ARGV[1] now (ms), ARGV[2] interval (ms).
/// Returns the new count. Stale hashes also carry a TTL so Redis drops them
/// on its own.
const INCREMENT_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local interval = tonumber(ARGV[2])

local expires_at = tonumber(redis.call('HGET', key, 'expires_at'))
if expires_at == nil or expires_at <= now then
    redis.call('HSET', key, 'count', 1, 'expires_at', now + interval)
    redis.call('PEXPIRE', key, interval)
    return 1
end

return redis.call('HINCRBY', key, 'count', 1)
"#;

/// Redis-backed counting store shared by every instance using the same server.
///
/// `now` is passed into the script from this instance's clock. As with the
/// Postgres store, instances with skewed clocks can reset a window early or
/// late by the amount of the skew.
pub struct RedisRateStore {
    conn: ConnectionManager,
    config: RedisConfig,
    clock: Arc<dyn Clock>,
    script: Script,
}

impl RedisRateStore {
    pub async fn new(config: RedisConfig) -> Result<Self, StoreError> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn with_clock(config: RedisConfig, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn_manager_fut = ConnectionManager::new(client);
        let conn = tokio::time::timeout(config.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| StoreError::Connection("Connection timed out".to_string()))?
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::info!(url = %config.url, "Connected to Redis rate limit store");

        Ok(Self {
            conn,
            config,
            clock,
            script: Script::new(INCREMENT_SCRIPT),
        })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, StoreError> {
        Self::new(RedisConfig::from_env()).await
    }

    fn make_key(&self, token: &str) -> String {
        format!("{}:{}", self.config.key_prefix, token)
    }
}

#[async_trait]
impl RateLimitStore for RedisRateStore {
    async fn increment(&self, token: &str, interval: Duration) -> Result<u64, StoreError> {
        let key = self.make_key(token);
        let now_ms = self.clock.now().timestamp_millis();
        // PEXPIRE rejects zero; a sub-millisecond window still lives 1ms.
        let interval_ms = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX).max(1);
        let mut conn = self.conn.clone();

        let count: i64 = self
            .script
            .key(&key)
            .arg(now_ms)
            .arg(interval_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                tracing::warn!(key = %key, error = %e, "Redis rate limit script failed");
                if e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
                    StoreError::Connection(e.to_string())
                } else {
                    StoreError::Query(e.to_string())
                }
            })?;

        u64::try_from(count).map_err(|_| StoreError::Corrupt(format!("negative count {}", count)))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
