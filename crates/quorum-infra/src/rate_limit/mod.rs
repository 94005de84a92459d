//! Counting store implementations.

mod config;
mod memory;
mod unavailable;

pub use config::{RateLimitConfig, RateLimiterOptions, StoreBackend, build_store};
pub use memory::InMemoryRateStore;
pub use unavailable::UnavailableStore;

#[cfg(feature = "postgres")]
pub(crate) mod postgres;
#[cfg(feature = "postgres")]
pub use postgres::PostgresRateStore;

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::{RedisConfig, RedisRateStore};
