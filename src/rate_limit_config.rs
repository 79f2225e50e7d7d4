use crate::algorithms::{
    FixedWindowLimiter, LeakyBucketLimiter, RateLimitAlgorithm, SlidingWindowLimiter,
    TokenBucketLimiter,
};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::store::CounterStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

/// Rate limit strategy enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitStrategy {
    FixedWindow,
    SlidingWindow,
    TokenBucket,
    LeakyBucket,
}

impl RateLimitStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitStrategy::FixedWindow => "fixed_window",
            RateLimitStrategy::SlidingWindow => "sliding_window",
            RateLimitStrategy::TokenBucket => "token_bucket",
            RateLimitStrategy::LeakyBucket => "leaky_bucket",
        }
    }
}

impl fmt::Display for RateLimitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateLimitStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed_window" => Ok(RateLimitStrategy::FixedWindow),
            "sliding_window" => Ok(RateLimitStrategy::SlidingWindow),
            "token_bucket" => Ok(RateLimitStrategy::TokenBucket),
            "leaky_bucket" => Ok(RateLimitStrategy::LeakyBucket),
            other => Err(Error::Configuration(format!(
                "unknown rate limit strategy '{}', expected one of: fixed_window, sliding_window, token_bucket, leaky_bucket",
                other
            ))),
        }
    }
}

/// Largest `limit`/`burst` the signed store counters can represent.
pub const MAX_LIMIT: u64 = i64::MAX as u64;

/// Strategy selection plus its numeric parameters.
///
/// Which fields matter depends on the strategy:
/// - `fixed_window` / `sliding_window`: `limit` requests per `window`
/// - `token_bucket`: `rate` tokens per second up to `burst`
/// - `leaky_bucket`: capacity `burst`, draining at `rate` per second
///
/// For the bucket strategies `window` is only the idle expiry of the stored state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RateLimitConfig {
    pub strategy: RateLimitStrategy,
    #[validate(range(min = 1, max = MAX_LIMIT))]
    pub limit: u64,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    #[validate(range(min = 1, max = MAX_LIMIT))]
    pub burst: u64,
    pub rate: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            strategy: RateLimitStrategy::FixedWindow,
            limit: 100,
            window: Duration::from_secs(60),
            burst: 20,
            rate: 10.0,
        }
    }
}

impl RateLimitConfig {
    pub fn fixed_window(limit: u64, window: Duration) -> Self {
        Self {
            strategy: RateLimitStrategy::FixedWindow,
            limit,
            window,
            ..Self::default()
        }
    }

    pub fn sliding_window(limit: u64, window: Duration) -> Self {
        Self {
            strategy: RateLimitStrategy::SlidingWindow,
            limit,
            window,
            ..Self::default()
        }
    }

    pub fn token_bucket(rate: f64, burst: u64, state_expiry: Duration) -> Self {
        Self {
            strategy: RateLimitStrategy::TokenBucket,
            rate,
            burst,
            window: state_expiry,
            ..Self::default()
        }
    }

    pub fn leaky_bucket(capacity: u64, leak_rate: f64, state_expiry: Duration) -> Self {
        Self {
            strategy: RateLimitStrategy::LeakyBucket,
            burst: capacity,
            rate: leak_rate,
            window: state_expiry,
            ..Self::default()
        }
    }

    /// Validate rule parameters
    pub fn check(&self) -> Result<()> {
        self.validate()?;

        if self.window.as_secs() == 0 {
            return Err(Error::Configuration(
                "window must be at least one second".to_string(),
            ));
        }
        // Window indexes are whole seconds; TTLs would disagree with them otherwise.
        if self.window.subsec_nanos() != 0 {
            return Err(Error::Configuration(format!(
                "window must be a whole number of seconds, got {:?}",
                self.window
            )));
        }
        let bucket = matches!(
            self.strategy,
            RateLimitStrategy::TokenBucket | RateLimitStrategy::LeakyBucket
        );
        if bucket && !(self.rate.is_finite() && self.rate > 0.0) {
            return Err(Error::Configuration(format!(
                "rate must be a positive number for {}, got {}",
                self.strategy, self.rate
            )));
        }
        Ok(())
    }

    /// Construct the configured algorithm over `store`.
    pub fn build(
        &self,
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<dyn RateLimitAlgorithm>> {
        self.check()?;

        let algorithm: Arc<dyn RateLimitAlgorithm> = match self.strategy {
            RateLimitStrategy::FixedWindow => Arc::new(FixedWindowLimiter::new(
                store,
                clock,
                self.limit,
                self.window,
            )),
            RateLimitStrategy::SlidingWindow => Arc::new(SlidingWindowLimiter::new(
                store,
                clock,
                self.limit,
                self.window,
            )),
            RateLimitStrategy::TokenBucket => Arc::new(TokenBucketLimiter::new(
                store,
                clock,
                self.rate,
                self.burst,
                self.window,
            )),
            RateLimitStrategy::LeakyBucket => Arc::new(LeakyBucketLimiter::new(
                store,
                clock,
                self.burst,
                self.rate,
                self.window,
            )),
        };

        tracing::debug!(strategy = %self.strategy, "rate limit algorithm constructed");
        Ok(algorithm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::store::MemoryStore;

    fn build(config: &RateLimitConfig) -> Result<Arc<dyn RateLimitAlgorithm>> {
        config.build(Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "sliding_window".parse::<RateLimitStrategy>().unwrap(),
            RateLimitStrategy::SlidingWindow
        );
        assert_eq!(
            " Token_Bucket ".parse::<RateLimitStrategy>().unwrap(),
            RateLimitStrategy::TokenBucket
        );
        assert!(matches!(
            "gcra".parse::<RateLimitStrategy>(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_builds_each_strategy() {
        let configs = [
            RateLimitConfig::fixed_window(10, Duration::from_secs(60)),
            RateLimitConfig::sliding_window(10, Duration::from_secs(60)),
            RateLimitConfig::token_bucket(1.0, 5, Duration::from_secs(60)),
            RateLimitConfig::leaky_bucket(5, 1.0, Duration::from_secs(60)),
        ];
        for config in configs {
            let algorithm = build(&config).unwrap();
            assert_eq!(algorithm.name(), config.strategy.as_str());
        }
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        let zero_limit = RateLimitConfig::fixed_window(0, Duration::from_secs(60));
        assert!(matches!(build(&zero_limit), Err(Error::Configuration(_))));

        let zero_window = RateLimitConfig::sliding_window(10, Duration::from_millis(200));
        assert!(build(&zero_window).is_err());

        let zero_rate = RateLimitConfig::token_bucket(0.0, 5, Duration::from_secs(60));
        assert!(build(&zero_rate).is_err());

        let nan_rate = RateLimitConfig::leaky_bucket(5, f64::NAN, Duration::from_secs(60));
        assert!(build(&nan_rate).is_err());
    }

    #[test]
    fn test_rejects_fractional_window() {
        let fractional = RateLimitConfig::fixed_window(10, Duration::from_millis(1500));
        assert!(matches!(build(&fractional), Err(Error::Configuration(_))));

        let whole = RateLimitConfig::sliding_window(10, Duration::from_secs(2));
        assert!(build(&whole).is_ok());
    }

    #[test]
    fn test_rejects_limits_beyond_counter_range() {
        let huge_limit = RateLimitConfig::fixed_window(u64::MAX, Duration::from_secs(60));
        assert!(matches!(build(&huge_limit), Err(Error::Configuration(_))));

        let huge_burst = RateLimitConfig::token_bucket(1.0, MAX_LIMIT + 1, Duration::from_secs(60));
        assert!(build(&huge_burst).is_err());

        let largest = RateLimitConfig::sliding_window(MAX_LIMIT, Duration::from_secs(60));
        assert!(build(&largest).is_ok());
    }

    #[test]
    fn test_deserializes_from_json() {
        let config: RateLimitConfig = serde_json::from_value(serde_json::json!({
            "strategy": "leaky_bucket",
            "limit": 1,
            "window": "5m",
            "burst": 10,
            "rate": 2.5
        }))
        .unwrap();

        assert_eq!(config.strategy, RateLimitStrategy::LeakyBucket);
        assert_eq!(config.window, Duration::from_secs(300));
        assert!(config.check().is_ok());

        let unknown = serde_json::from_value::<RateLimitConfig>(serde_json::json!({
            "strategy": "unknown",
            "limit": 1,
            "window": "1m",
            "burst": 1,
            "rate": 1.0
        }));
        assert!(unknown.is_err());
    }
}
