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

pub const KEY_PREFIX: &str = "rate_limit_token_bucket";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBucketState {
    pub tokens: f64,
    pub last_refill: DateTime<Utc>,
}

/// Token bucket: starts full at `burst` tokens and refills at `rate`
/// tokens per second. Each admitted request takes one token.
///
/// Rejections leave the stored state untouched.
pub struct TokenBucketLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    rate: f64,
    burst: u64,
    state_expiry: Duration,
}

impl TokenBucketLimiter {
    pub fn new(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        rate: f64,
        burst: u64,
        state_expiry: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            rate,
            burst,
            state_expiry,
        }
    }

    fn key(&self, identifier: &str) -> String {
        format!("{}:{}", KEY_PREFIX, identifier)
    }

    /// Stored state with refill applied up to `now`.
    async fn refilled(&self, key: &str, now: DateTime<Utc>) -> Result<f64> {
        let state = load_state::<TokenBucketState>(self.store.as_ref(), key)
            .await?
            .unwrap_or(TokenBucketState {
                tokens: self.burst as f64,
                last_refill: now,
            });

        let elapsed = elapsed_secs(state.last_refill, now);
        Ok((state.tokens + elapsed * self.rate).min(self.burst as f64))
    }
}

#[async_trait]
impl RateLimitAlgorithm for TokenBucketLimiter {
    fn name(&self) -> &'static str {
        "token_bucket"
    }

    async fn allow(&self, identifier: &str) -> Result<bool> {
        let key = self.key(identifier);
        let now = self.clock.now();
        let tokens = self.refilled(&key, now).await?;

        if tokens < 1.0 {
            debug!(key = %key, tokens, "token bucket empty");
            return Ok(false);
        }

        let state = TokenBucketState {
            tokens: tokens - 1.0,
            last_refill: now,
        };
        save_state(self.store.as_ref(), &key, &state, self.state_expiry).await?;
        Ok(true)
    }

    async fn info(&self, identifier: &str) -> Result<RateLimitInfo> {
        let now = self.clock.now();
        let tokens = self.refilled(&self.key(identifier), now).await?;

        // Time until the bucket is full again, not until the next token.
        let seconds_to_full = if self.rate > 0.0 {
            ((self.burst as f64 - tokens) / self.rate) as i64
        } else {
            0
        };

        Ok(RateLimitInfo {
            limit: self.burst,
            remaining: tokens.max(0.0) as u64,
            reset: now.timestamp() + seconds_to_full,
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
    use crate::error::Error;
    use crate::store::MemoryStore;

    fn limiter(store: Arc<MemoryStore>, clock: ManualClock) -> TokenBucketLimiter {
        TokenBucketLimiter::new(store, Arc::new(clock), 1.0, 5, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_starts_full_then_refills() {
        let (store, clock) = fixture();
        let limiter = limiter(store, clock.clone());

        for _ in 0..5 {
            assert!(limiter.allow("api:k").await.unwrap());
        }
        assert!(!limiter.allow("api:k").await.unwrap());

        clock.advance(Duration::from_secs(5));
        for _ in 0..5 {
            assert!(limiter.allow("api:k").await.unwrap());
        }
        assert!(!limiter.allow("api:k").await.unwrap());
    }

    #[tokio::test]
    async fn test_denial_does_not_persist() {
        let (store, clock) = fixture();
        let limiter = limiter(store.clone(), clock.clone());

        for _ in 0..5 {
            limiter.allow("api:k").await.unwrap();
        }
        let key = format!("{}:api:k", KEY_PREFIX);
        let before = store.get_state(&key).await.unwrap();

        clock.advance(Duration::from_millis(500));
        assert!(!limiter.allow("api:k").await.unwrap());
        assert_eq!(store.get_state(&key).await.unwrap(), before);

        // Half a token accrued before the denial still counts.
        clock.advance(Duration::from_millis(500));
        assert!(limiter.allow("api:k").await.unwrap());
    }

    #[tokio::test]
    async fn test_info_estimates_time_to_full() {
        let (store, clock) = fixture();
        let limiter = limiter(store, clock.clone());

        let fresh = limiter.info("api:k").await.unwrap();
        assert_eq!(
            fresh,
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
    async fn test_malformed_state_is_an_error() {
        let (store, clock) = fixture();
        let limiter = limiter(store.clone(), clock);
        store
            .set_state(&format!("{}:api:k", KEY_PREFIX), "{garbage", Duration::from_secs(60))
            .await
            .unwrap();

        let err = limiter.allow("api:k").await.unwrap_err();
        assert!(matches!(err, Error::MalformedState { .. }));
    }

    #[tokio::test]
    async fn test_future_timestamp_does_not_overfill() {
        let (store, clock) = fixture();
        let limiter = limiter(store.clone(), clock.clone());
        let state = TokenBucketState {
            tokens: 0.0,
            last_refill: clock.now() + chrono::Duration::seconds(30),
        };
        save_state(store.as_ref(), &format!("{}:api:k", KEY_PREFIX), &state, Duration::from_secs(60))
            .await
            .unwrap();

        assert!(!limiter.allow("api:k").await.unwrap());
    }
}
