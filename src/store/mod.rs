//! Counter/state storage consumed by the rate limiting algorithms.
//!
//! Windowed strategies need an atomic increment; bucket strategies only need
//! get/set of an opaque blob and accept that two concurrent read-modify-write
//! cycles on the same key may both admit a request.

pub mod memory;
pub mod redis;

use crate::error::StoreError;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Run a store operation, failing with [`StoreError::Timeout`] once `deadline` passes.
pub async fn with_deadline<T, F>(deadline: Duration, op: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(deadline, op).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(deadline)),
    }
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment `key`, creating it at 1 if absent.
    async fn increment_and_get(&self, key: &str) -> StoreResult<i64>;

    /// Set or overwrite the TTL of `key`. Absent keys are ignored.
    async fn set_expiry(&self, key: &str, ttl: Duration) -> StoreResult<()>;

    /// Non-incrementing read. Absent keys count as 0.
    async fn get_count(&self, key: &str) -> StoreResult<i64>;

    async fn delete_key(&self, key: &str) -> StoreResult<()>;

    async fn set_state(&self, key: &str, state: &str, ttl: Duration) -> StoreResult<()>;

    /// Returns [`StoreError::NotFound`] when no state is stored under `key`.
    async fn get_state(&self, key: &str) -> StoreResult<String>;

    async fn ping(&self) -> StoreResult<()>;

    /// Increment `key`, applying `ttl` only when this call created it.
    ///
    /// An existing key keeps whatever TTL it already has.
    async fn increment_preserve_ttl(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        let count = self.increment_and_get(key).await?;
        if count == 1 && !ttl.is_zero() {
            self.set_expiry(key, ttl).await?;
        }
        Ok(count)
    }
}
