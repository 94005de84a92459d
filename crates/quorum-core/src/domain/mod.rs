//! Domain entities - rate windows and the tokens they are keyed by.

mod token;
mod window;

pub use token::RateToken;
pub use window::{RateWindow, window_end};
