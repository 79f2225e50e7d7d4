//! Sliding window rate limiting algorithm
//!
//! Approximates a true sliding window from two fixed-window counters: the
//! previous window's count is weighted by the fraction of it still inside
//! the sliding view and added to the current window's count.
//!
//! The two counters are read independently, so the weighted sum may be
//! slightly stale under concurrent writers. Only admitted requests are
//! counted.

use super::{window_secs, RateLimitAlgorithm, RateLimitInfo};
use crate::clock::Clock;
use crate::error::Result;
use crate::store::CounterStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const KEY_PREFIX: &str = "rate_limit_sliding_window";

/// Sliding window rate limiter implementation
pub struct SlidingWindowLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    limit: u64,
    window: Duration,
}

/// Counts observed at one instant.
struct WindowView {
    current_key: String,
    current_window: i64,
    weighted_count: i64,
}

impl SlidingWindowLimiter {
    /// Create a new sliding window rate limiter
    pub fn new(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        limit: u64,
        window: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            limit,
            window,
        }
    }

    fn window_key(&self, identifier: &str, window_index: i64) -> String {
        format!("{}:{}:{}", KEY_PREFIX, identifier, window_index)
    }

    async fn view(&self, identifier: &str) -> Result<WindowView> {
        let size = window_secs(self.window);
        let now = self.clock.now().timestamp();
        let current_window = now.div_euclid(size);

        let current_key = self.window_key(identifier, current_window);
        let previous_key = self.window_key(identifier, current_window - 1);

        let current_count = self.store.get_count(&current_key).await?;
        let previous_count = self.store.get_count(&previous_key).await?;

        let offset = now.rem_euclid(size) as f64 / size as f64;
        let previous_weight = 1.0 - offset;
        let weighted_count = (previous_count as f64 * previous_weight).floor() as i64 + current_count;

        Ok(WindowView {
            current_key,
            current_window,
            weighted_count,
        })
    }
}

#[async_trait]
impl RateLimitAlgorithm for SlidingWindowLimiter {
    fn name(&self) -> &'static str {
        "sliding_window"
    }

    async fn allow(&self, identifier: &str) -> Result<bool> {
        let view = self.view(identifier).await?;

        if view.weighted_count >= self.limit as i64 {
            debug!(
                key = %view.current_key,
                weighted_count = view.weighted_count,
                limit = self.limit,
                "sliding window denied"
            );
            return Ok(false);
        }

        // The counter must survive into the next window, where it is read as
        // the previous one.
        self.store
            .increment_preserve_ttl(&view.current_key, self.window * 2)
            .await?;
        Ok(true)
    }

    async fn info(&self, identifier: &str) -> Result<RateLimitInfo> {
        let view = self.view(identifier).await?;

        Ok(RateLimitInfo {
            limit: self.limit,
            remaining: (self.limit as i64 - view.weighted_count).max(0) as u64,
            reset: (view.current_window + 1) * window_secs(self.window),
        })
    }

    async fn reset(&self, identifier: &str) -> Result<()> {
        let current_window = self
            .clock
            .now()
            .timestamp()
            .div_euclid(window_secs(self.window));
        self.store
            .delete_key(&self.window_key(identifier, current_window))
            .await?;
        self.store
            .delete_key(&self.window_key(identifier, current_window - 1))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::test_support::{fixture, T0};
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn limiter(store: Arc<MemoryStore>, clock: ManualClock) -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(store, Arc::new(clock), 10, Duration::from_secs(60))
    }

    async fn fill_previous_window(limiter: &SlidingWindowLimiter, clock: &ManualClock) {
        for _ in 0..10 {
            assert!(limiter.allow("api:k").await.unwrap());
        }
        assert!(!limiter.allow("api:k").await.unwrap());
        clock.advance(Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_full_previous_window_denies_at_boundary() {
        let (store, clock) = fixture();
        let limiter = limiter(store, clock.clone());
        fill_previous_window(&limiter, &clock).await;

        // offset 0: weight 1, weighted count 10, and 10 < 10 is false
        assert!(!limiter.allow("api:k").await.unwrap());
    }

    #[tokio::test]
    async fn test_half_window_weights_previous_count() {
        let (store, clock) = fixture();
        let limiter = limiter(store, clock.clone());
        fill_previous_window(&limiter, &clock).await;
        clock.advance(Duration::from_secs(30));

        // weight 0.5 leaves room for exactly five more requests
        for _ in 0..5 {
            assert!(limiter.allow("api:k").await.unwrap());
        }
        assert!(!limiter.allow("api:k").await.unwrap());
    }

    #[tokio::test]
    async fn test_denied_requests_are_not_counted() {
        let (store, clock) = fixture();
        let limiter = limiter(store.clone(), clock);

        for _ in 0..15 {
            limiter.allow("api:k").await.unwrap();
        }
        let key = format!("{}:api:k:{}", KEY_PREFIX, T0 / 60);
        assert_eq!(store.get_count(&key).await.unwrap(), 10);
        assert_eq!(store.ttl(&key), Some(Duration::from_secs(120)));
    }

    #[tokio::test]
    async fn test_info_mirrors_weighted_count() {
        let (store, clock) = fixture();
        let limiter = limiter(store, clock.clone());
        fill_previous_window(&limiter, &clock).await;
        clock.advance(Duration::from_secs(45));

        let info = limiter.info("api:k").await.unwrap();
        // floor(10 * 0.25) = 2
        assert_eq!(
            info,
            RateLimitInfo {
                limit: 10,
                remaining: 8,
                reset: T0 + 120,
            }
        );
        assert_eq!(limiter.info("api:k").await.unwrap(), info);
    }

    #[tokio::test]
    async fn test_reset_clears_both_windows() {
        let (store, clock) = fixture();
        let limiter = limiter(store, clock.clone());
        fill_previous_window(&limiter, &clock).await;

        limiter.reset("api:k").await.unwrap();
        assert_eq!(limiter.info("api:k").await.unwrap().remaining, 10);
    }
}
