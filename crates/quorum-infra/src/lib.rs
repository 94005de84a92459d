//! # Quorum Infrastructure
//!
//! Concrete counting stores for the rate limiter defined in `quorum-core`.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external dependencies, in-memory only
//! - `postgres` - Shared `rate_limits` table via SeaORM
//! - `redis` - Redis-backed counting store

pub mod database;
pub mod rate_limit;

// Re-exports - In-Memory
pub use rate_limit::{
    InMemoryRateStore, RateLimitConfig, RateLimiterOptions, StoreBackend, UnavailableStore,
    build_store,
};

// Re-exports - Postgres
#[cfg(feature = "postgres")]
pub use rate_limit::PostgresRateStore;

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use rate_limit::{RedisConfig, RedisRateStore};
