use super::{with_deadline, CounterStore, StoreResult};
use crate::error::StoreError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::future::Future;
use std::time::Duration;
use tokio::time;

/// INCR and, only when the key was just created, PEXPIRE in one round trip.
const INCREMENT_PRESERVE_TTL: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 and tonumber(ARGV[1]) > 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

/// Redis-backed store. Every command is bounded by `op_timeout`.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    op_timeout: Duration,
    incr_script: Script,
}

fn millis(ttl: Duration) -> u64 {
    ttl.as_millis().min(u128::from(u64::MAX)) as u64
}

impl RedisStore {
    pub async fn connect(redis_url: &str, op_timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)
            .map_err(|e| StoreError::Unavailable(format!("Failed to create Redis client: {}", e)))?;

        let connection = time::timeout(op_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(op_timeout))?
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect to Redis: {}", e)))?;

        tracing::info!(redis_url = %redis_url, "Connected to Redis");

        Ok(Self {
            connection,
            op_timeout,
            incr_script: Script::new(INCREMENT_PRESERVE_TTL),
        })
    }

    async fn bounded<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        with_deadline(self.op_timeout, async move { op.await.map_err(StoreError::from) }).await
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment_and_get(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.connection.clone();
        self.bounded(redis::cmd("INCR").arg(key).query_async::<_, i64>(&mut conn))
            .await
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        self.bounded(
            redis::cmd("PEXPIRE")
                .arg(key)
                .arg(millis(ttl))
                .query_async::<_, i64>(&mut conn),
        )
        .await
        .map(|_| ())
    }

    async fn get_count(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.connection.clone();
        let value = self
            .bounded(redis::cmd("GET").arg(key).query_async::<_, Option<String>>(&mut conn))
            .await?;

        match value {
            None => Ok(0),
            Some(raw) => raw.parse::<i64>().map_err(|e| StoreError::InvalidValue {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn delete_key(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        self.bounded(redis::cmd("DEL").arg(key).query_async::<_, i64>(&mut conn))
            .await
            .map(|_| ())
    }

    async fn set_state(&self, key: &str, state: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(state);
        if !ttl.is_zero() {
            cmd.arg("PX").arg(millis(ttl));
        }
        self.bounded(cmd.query_async::<_, ()>(&mut conn)).await
    }

    async fn get_state(&self, key: &str) -> StoreResult<String> {
        let mut conn = self.connection.clone();
        self.bounded(redis::cmd("GET").arg(key).query_async::<_, Option<String>>(&mut conn))
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        self.bounded(redis::cmd("PING").query_async::<_, String>(&mut conn))
            .await
            .map(|_| ())
    }

    async fn increment_preserve_ttl(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        let mut conn = self.connection.clone();
        self.bounded(
            self.incr_script
                .key(key)
                .arg(millis(ttl))
                .invoke_async::<_, i64>(&mut conn),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connect() -> RedisStore {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        RedisStore::connect(&url, Duration::from_secs(1)).await.unwrap()
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_secs(2)), 2_000);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let result = RedisStore::connect("not-a-url", Duration::from_millis(100)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore = "requires a running Redis (REDIS_URL)"]
    async fn test_increment_preserve_ttl_against_redis() {
        let store = connect().await;
        let key = format!("ratekeeper:test:{}", uuid::Uuid::new_v4());

        assert_eq!(store.increment_preserve_ttl(&key, Duration::from_secs(30)).await.unwrap(), 1);
        assert_eq!(store.increment_preserve_ttl(&key, Duration::from_secs(30)).await.unwrap(), 2);
        assert_eq!(store.get_count(&key).await.unwrap(), 2);

        store.delete_key(&key).await.unwrap();
        assert_eq!(store.get_count(&key).await.unwrap(), 0);
        assert!(matches!(store.get_state(&key).await, Err(StoreError::NotFound(_))));
    }
}
