//! # Quorum Core
//!
//! The rate limiting domain of the Quorum polling backend.
//! Pure logic: fixed-window accounting, token validation and the ports
//! that counting stores must implement. No infrastructure dependencies.

pub mod domain;
pub mod error;
pub mod limiter;
pub mod ports;

pub use error::RateLimitError;
pub use limiter::{DEFAULT_INTERVAL, MIN_INTERVAL, RateLimitStatus, RateLimiter};
