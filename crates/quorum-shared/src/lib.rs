//! # Quorum Shared
//!
//! Wire types shared by the gateway and its clients.

pub mod dto;
pub mod response;

pub use dto::HealthResponse;
pub use response::ErrorResponse;
