//! Fixed window counter.
//!
//! Each window is a separate counter keyed by `floor(now / window)`. Every
//! request increments the counter, including ones that end up rejected.

use super::{window_secs, RateLimitAlgorithm, RateLimitInfo};
use crate::clock::Clock;
use crate::error::Result;
use crate::store::CounterStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const KEY_PREFIX: &str = "rate_limit_fixed_window";

pub struct FixedWindowLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    limit: u64,
    window: Duration,
}

impl FixedWindowLimiter {
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

    fn window_index(&self) -> i64 {
        self.clock.now().timestamp().div_euclid(window_secs(self.window))
    }

    fn window_key(&self, identifier: &str, window_index: i64) -> String {
        format!("{}:{}:{}", KEY_PREFIX, identifier, window_index)
    }
}

#[async_trait]
impl RateLimitAlgorithm for FixedWindowLimiter {
    fn name(&self) -> &'static str {
        "fixed_window"
    }

    async fn allow(&self, identifier: &str) -> Result<bool> {
        let key = self.window_key(identifier, self.window_index());
        let count = self.store.increment_preserve_ttl(&key, self.window).await?;
        let allowed = count <= self.limit as i64;

        debug!(key = %key, count, limit = self.limit, allowed, "fixed window decision");
        Ok(allowed)
    }

    async fn info(&self, identifier: &str) -> Result<RateLimitInfo> {
        let window_index = self.window_index();
        let count = self
            .store
            .get_count(&self.window_key(identifier, window_index))
            .await?;

        Ok(RateLimitInfo {
            limit: self.limit,
            remaining: (self.limit as i64 - count).max(0) as u64,
            reset: (window_index + 1) * window_secs(self.window),
        })
    }

    async fn reset(&self, identifier: &str) -> Result<()> {
        let key = self.window_key(identifier, self.window_index());
        self.store.delete_key(&key).await?;
        Ok(())
    }
}
