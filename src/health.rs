use crate::response::{HealthResponse, StoreStatus};
use crate::store::CounterStore;
use std::sync::Arc;
use std::time::Instant;

/// Pings the backing store and reports how long it took.
#[derive(Clone)]
pub struct HealthChecker {
    store: Arc<dyn CounterStore>,
    backend: &'static str,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn CounterStore>, backend: &'static str) -> Self {
        Self { store, backend }
    }

    pub async fn check_health(&self) -> HealthResponse {
        HealthResponse::new(self.check_store().await)
    }

    async fn check_store(&self) -> StoreStatus {
        let start = Instant::now();
        let result = self.store.ping().await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => StoreStatus {
                backend: self.backend.to_string(),
                status: "connected".to_string(),
                response_time_ms,
                error: None,
            },
            Err(e) => {
                tracing::warn!(backend = self.backend, error = %e, "store health check failed");
                StoreStatus {
                    backend: self.backend.to_string(),
                    status: "unavailable".to_string(),
                    response_time_ms,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{MemoryStore, StoreResult};
    use async_trait::async_trait;
    use std::time::Duration;

    struct DownStore;

    #[async_trait]
    impl CounterStore for DownStore {
        async fn increment_and_get(&self, _key: &str) -> StoreResult<i64> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn set_expiry(&self, _key: &str, _ttl: Duration) -> StoreResult<()> {
            Ok(())
        }
        async fn get_count(&self, _key: &str) -> StoreResult<i64> {
            Ok(0)
        }
        async fn delete_key(&self, _key: &str) -> StoreResult<()> {
            Ok(())
        }
        async fn set_state(&self, _key: &str, _state: &str, _ttl: Duration) -> StoreResult<()> {
            Ok(())
        }
        async fn get_state(&self, key: &str) -> StoreResult<String> {
            Err(StoreError::NotFound(key.to_string()))
        }
        async fn ping(&self) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_memory_store_is_healthy() {
        let checker = HealthChecker::new(Arc::new(MemoryStore::new()), "memory");
        let health = checker.check_health().await;

        assert!(health.is_healthy());
        assert_eq!(health.status, "healthy");
        assert_eq!(health.store.backend, "memory");
        assert_eq!(health.store.status, "connected");
    }

    #[tokio::test]
    async fn test_unreachable_store_is_unhealthy() {
        let checker = HealthChecker::new(Arc::new(DownStore), "redis");
        let health = checker.check_health().await;

        assert!(!health.is_healthy());
        assert_eq!(health.status, "unhealthy");
        assert_eq!(health.store.status, "unavailable");
        assert!(health
            .store
            .error
            .as_deref()
            .is_some_and(|e| e.contains("connection refused")));
    }
}
