use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Fixed counting window for one token.
///
/// A window is current while `now < expires_at`. Once that stops holding the
/// window is stale and the next hit replaces it instead of incrementing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
    pub token: String,
    pub count: u64,
    pub expires_at: DateTime<Utc>,
}

impl RateWindow {
    /// Start a fresh window holding the request that opened it.
    pub fn open(token: impl Into<String>, now: DateTime<Utc>, interval: Duration) -> Self {
        Self {
            token: token.into(),
            count: 1,
            expires_at: window_end(now, interval),
        }
    }

    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Record one request at `now` and return the resulting count.
    ///
    /// The staleness check runs before the increment: an expired window is
    /// reset to 1, never bumped. The expiry of a current window is left alone.
    pub fn hit(&mut self, now: DateTime<Utc>, interval: Duration) -> u64 {
        if self.is_current(now) {
            self.count = self.count.saturating_add(1);
        } else {
            self.count = 1;
            self.expires_at = window_end(now, interval);
        }
        self.count
    }
}

/// Absolute expiry of a window opened at `now`, saturating at the last
/// representable instant.
pub fn window_end(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let millis = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
    TimeDelta::try_milliseconds(millis)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
