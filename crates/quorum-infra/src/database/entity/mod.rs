//! SeaORM entities.

pub mod rate_limit;
