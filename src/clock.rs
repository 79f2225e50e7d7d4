//! Time source used by the rate limiting algorithms.
//!
//! Every algorithm reads "now" through a [`Clock`] so that window rotation,
//! refill and leak math can be driven deterministically in tests.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::{Arc, RwLock};
use std::time::Duration;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Start at the given Unix timestamp (seconds).
    pub fn at_unix(secs: i64) -> Self {
        Self::new(DateTime::from_timestamp(secs, 0).unwrap_or_default())
    }

    pub fn advance(&self, by: Duration) {
        let delta = ChronoDuration::from_std(by).unwrap_or(ChronoDuration::zero());
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += delta;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Seconds elapsed from `earlier` to `later` as a float, clamped at zero.
///
/// A stored timestamp that lies in the future relative to `later` yields
/// zero elapsed time rather than a negative refill or leak.
pub fn elapsed_secs(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let delta = later.signed_duration_since(earlier);
    match delta.num_microseconds() {
        Some(us) if us > 0 => us as f64 / 1_000_000.0,
        Some(_) => 0.0,
        None => delta.num_seconds().max(0) as f64,
    }
}
