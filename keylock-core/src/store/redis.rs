//! Redis lock store
//!
//! Adapts a shared [`RedisService`] handle to the lock primitives. Records are
//! plain string keys created with `SET NX PX` and removed or extended only
//! through server-side compare scripts.

use crate::error::LockResult;
use crate::store::LockStore;
use async_trait::async_trait;
use keylock_redis::{RedisConfig, RedisService};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Redis-backed lock store
#[derive(Clone)]
pub struct RedisLockStore {
    redis: Arc<RedisService>,
}

impl RedisLockStore {
    /// Wrap an existing, long-lived Redis service handle.
    pub fn new(redis: Arc<RedisService>) -> Self {
        Self { redis }
    }

    /// Build a connection pool from `config` and wrap it.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid, the pool cannot be created
    /// or the server does not answer PING.
    pub async fn connect(config: RedisConfig) -> LockResult<Self> {
        debug!(url = %config.url, "Connecting to Redis for distributed locks");
        let redis = RedisService::new(config).await?;
        Ok(Self::new(Arc::new(redis)))
    }

    /// Underlying service handle
    pub fn service(&self) -> &Arc<RedisService> {
        &self.redis
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LockResult<bool> {
        Ok(self.redis.set_nx_px(key, value, ttl).await?)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> LockResult<bool> {
        Ok(self.redis.delete_if_equals(key, expected).await?)
    }

    async fn get(&self, key: &str) -> LockResult<Option<String>> {
        Ok(self.redis.get_value(key).await?)
    }

    async fn expire_if_equals(&self, key: &str, expected: &str, ttl: Duration) -> LockResult<bool> {
        Ok(self.redis.expire_if_equals(key, expected, ttl).await?)
    }

    fn store_type(&self) -> &'static str {
        "redis"
    }
}

impl std::fmt::Debug for RedisLockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisLockStore")
            .field("redis", &self.redis)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    // Redis tests require a running Redis instance
    // Run with: cargo test -- --ignored

    use super::*;

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_redis_store_primitives() {
        let store = RedisLockStore::connect(RedisConfig::from_env().build())
            .await
            .unwrap();
        let key = "keylock:test:store";
        store.delete_if_equals(key, "a").await.unwrap();

        assert!(store.set_if_absent(key, "a", Duration::from_secs(5)).await.unwrap());
        assert!(!store.set_if_absent(key, "b", Duration::from_secs(5)).await.unwrap());
        assert_eq!(store.get(key).await.unwrap(), Some("a".to_string()));
        assert!(store.expire_if_equals(key, "a", Duration::from_secs(5)).await.unwrap());
        assert!(store.delete_if_equals(key, "a").await.unwrap());
        assert_eq!(store.get(key).await.unwrap(), None);
    }
}
