//! Rate limiting algorithms module
//!
//! Four interchangeable strategies sharing one storage contract. None of them
//! holds mutable state of its own: every decision is computed from store
//! reads and writes, so a single instance can be shared across all request
//! tasks behind an `Arc`.

pub mod fixed_window;
pub mod leaky_bucket;
pub mod sliding_window;
pub mod token_bucket;

use crate::error::{Error, Result, StoreError};
use crate::store::CounterStore;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use fixed_window::FixedWindowLimiter;
pub use leaky_bucket::LeakyBucketLimiter;
pub use sliding_window::SlidingWindowLimiter;
pub use token_bucket::TokenBucketLimiter;

/// Snapshot of a client's rate limit, as rendered into response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub limit: u64,
    pub remaining: u64,
    /// Absolute Unix time in seconds.
    pub reset: i64,
}

/// Trait for rate limiting algorithms
#[async_trait]
pub trait RateLimitAlgorithm: Send + Sync {
    /// Strategy tag, as used in configuration.
    fn name(&self) -> &'static str;

    /// Decide whether a request from `identifier` may proceed.
    async fn allow(&self, identifier: &str) -> Result<bool>;

    /// Current limit state for `identifier`. Never mutates the store.
    async fn info(&self, identifier: &str) -> Result<RateLimitInfo>;

    /// Drop the stored state for `identifier`.
    async fn reset(&self, identifier: &str) -> Result<()>;
}

/// Window length in whole seconds, never less than one.
pub(crate) fn window_secs(window: Duration) -> i64 {
    window.as_secs().clamp(1, i64::MAX as u64) as i64
}

/// Load a bucket state blob. `Ok(None)` means no state has been stored yet.
pub(crate) async fn load_state<T: DeserializeOwned>(
    store: &dyn CounterStore,
    key: &str,
) -> Result<Option<T>> {
    match store.get_state(key).await {
        Ok(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| Error::MalformedState {
                key: key.to_string(),
                source,
            }),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn save_state<T: Serialize + Sync>(
    store: &dyn CounterStore,
    key: &str,
    state: &T,
    ttl: Duration,
) -> Result<()> {
    let raw = serde_json::to_string(state).map_err(Error::StateEncoding)?;
    store.set_state(key, &raw, ttl).await?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Probe {
        level: i64,
    }

    #[test]
    fn test_window_secs_floor() {
        assert_eq!(window_secs(Duration::from_millis(10)), 1);
        assert_eq!(window_secs(Duration::from_secs(60)), 60);
    }

    #[tokio::test]
    async fn test_load_state_distinguishes_missing_from_malformed() {
        let store = MemoryStore::new();
        let missing: Option<Probe> = load_state(&store, "k").await.unwrap();
        assert_eq!(missing, None);

        store.set_state("k", "not json", Duration::from_secs(5)).await.unwrap();
        let err = load_state::<Probe>(&store, "k").await.unwrap_err();
        assert!(matches!(err, Error::MalformedState { .. }));

        save_state(&store, "k", &Probe { level: 3 }, Duration::from_secs(5))
            .await
            .unwrap();
        let loaded: Option<Probe> = load_state(&store, "k").await.unwrap();
        assert_eq!(loaded, Some(Probe { level: 3 }));
    }
}
