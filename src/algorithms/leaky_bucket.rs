use super::{load_state, save_state, RateLimitAlgorithm, RateLimitInfo};
use crate::clock::{elapsed_secs, Clock};
use crate::error::Result;
use crate::store::CounterStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const KEY_PREFIX: &str = "rate_limit_leaky_bucket";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakyBucketState {
    pub water: i64,
    pub last_leak: DateTime<Utc>,
}

/// Leaky bucket: starts empty, each admitted request adds one unit and the
/// bucket drains whole units at `leak_rate` per second.
///
/// Unlike the token bucket, state is written back on every call, including
/// rejections.
pub struct LeakyBucketLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    capacity: u64,
    leak_rate: f64,
    state_expiry: Duration,
}

impl LeakyBucketLimiter {
    pub fn new(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        capacity: u64,
        leak_rate: f64,
        state_expiry: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            capacity,
            leak_rate,
            state_expiry,
        }
    }

    fn key(&self, identifier: &str) -> String {
        format!("{}:{}", KEY_PREFIX, identifier)
    }

    /// Stored state with leakage applied up to `now`. `last_leak` is left as stored.
    async fn drained(&self, key: &str, now: DateTime<Utc>) -> Result<LeakyBucketState> {
        let mut state = load_state::<LeakyBucketState>(self.store.as_ref(), key)
            .await?
            .unwrap_or(LeakyBucketState {
                water: 0,
                last_leak: now,
            });

        let leaked = (elapsed_secs(state.last_leak, now) * self.leak_rate).floor() as i64;
        state.water = (state.water - leaked).max(0);
        Ok(state)
    }
}

#[async_trait]
impl RateLimitAlgorithm for LeakyBucketLimiter {
    fn name(&self) -> &'static str {
        "leaky_bucket"
    }

    async fn allow(&self, identifier: &str) -> Result<bool> {
        let key = self.key(identifier);
        let now = self.clock.now();
        let mut state = self.drained(&key, now).await?;

        if state.water >= self.capacity as i64 {
            save_state(self.store.as_ref(), &key, &state, self.state_expiry).await?;
            debug!(key = %key, water = state.water, capacity = self.capacity, "leaky bucket full");
            return Ok(false);
        }

        state.water += 1;
        state.last_leak = now;
        save_state(self.store.as_ref(), &key, &state, self.state_expiry).await?;
        Ok(true)
    }

    async fn info(&self, identifier: &str) -> Result<RateLimitInfo> {
        let now = self.clock.now();
        let state = self.drained(&self.key(identifier), now).await?;

        let reset = if state.water > 0 && self.leak_rate > 0.0 {
            now.timestamp() + (state.water as f64 / self.leak_rate) as i64
        } else {
            now.timestamp()
        };

        Ok(RateLimitInfo {
            limit: self.capacity,
            remaining: (self.capacity as i64 - state.water).max(0) as u64,
            reset,
        })
    }

    async fn reset(&self, identifier: &str) -> Result<()> {
        self.store.delete_key(&self.key(identifier)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::test_support::{fixture, T0};
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn limiter(store: Arc<MemoryStore>, clock: ManualClock) -> LeakyBucketLimiter {
        LeakyBucketLimiter::new(store, Arc::new(clock), 5, 1.0, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_fills_then_leaks_whole_units() {
        let (store, clock) = fixture();
        let limiter = limiter(store, clock.clone());

        for _ in 0..5 {
            assert!(limiter.allow("api:k").await.unwrap());
        }
        assert!(!limiter.allow("api:k").await.unwrap());

        clock.advance(Duration::from_secs(2));
        assert!(limiter.allow("api:k").await.unwrap());
        assert!(limiter.allow("api:k").await.unwrap());
        assert!(!limiter.allow("api:k").await.unwrap());
    }

    #[tokio::test]
    async fn test_denial_persists_state() {
        let (store, clock) = fixture();
        let limiter = limiter(store.clone(), clock.clone());
        let key = format!("{}:api:k", KEY_PREFIX);
        let full = LeakyBucketState {
            water: 5,
            last_leak: clock.now(),
        };
        save_state(store.as_ref(), &key, &full, Duration::from_secs(1))
            .await
            .unwrap();

        assert!(!limiter.allow("api:k").await.unwrap());
        // The rejection rewrote the blob with the full state expiry.
        assert_eq!(store.ttl(&key), Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_info_reports_time_to_empty() {
        let (store, clock) = fixture();
        let limiter = limiter(store, clock.clone());

        assert_eq!(
            limiter.info("api:k").await.unwrap(),
            RateLimitInfo {
                limit: 5,
                remaining: 5,
                reset: T0,
            }
        );

        for _ in 0..3 {
            limiter.allow("api:k").await.unwrap();
        }
        let info = limiter.info("api:k").await.unwrap();
        assert_eq!(info.remaining, 2);
        assert_eq!(info.reset, T0 + 3);
        assert_eq!(limiter.info("api:k").await.unwrap(), info);
    }

    #[tokio::test]
    async fn test_partial_leak_is_not_counted() {
        let (store, clock) = fixture();
        let limiter = limiter(store, clock.clone());

        for _ in 0..5 {
            limiter.allow("api:k").await.unwrap();
        }
        clock.advance(Duration::from_millis(900));
        assert!(!limiter.allow("api:k").await.unwrap());
    }
}
