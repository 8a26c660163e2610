//! Redis service exposing the conditional primitives lock records rely on.

use bb8::{Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;
use tracing::{info, trace};

use crate::{RedisConfig, RedisError, Result};

/// Deletes `KEYS[1]` only while it still stores `ARGV[1]`.
const DELETE_IF_EQUALS: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("del", KEYS[1])
    else
        return 0
    end
"#;

/// Resets the expiry of `KEYS[1]` to `ARGV[2]` milliseconds only while it still stores `ARGV[1]`.
const EXPIRE_IF_EQUALS: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("pexpire", KEYS[1], ARGV[2])
    else
        return 0
    end
"#;

/// Pooled client for the atomic operations lease-based records are built from.
///
/// One service is meant to live for the whole process and be shared
/// (usually behind an `Arc`) by everything that talks to Redis.
pub struct RedisService {
    config: RedisConfig,
    pool: Pool<RedisConnectionManager>,
}

impl RedisService {
    /// Validate `config`, open the pool and confirm the server answers.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        config.validate()?;

        let manager = RedisConnectionManager::new(config.connection_url())
            .map_err(|e| RedisError::Config(e.to_string()))?;
        let pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(config.min_idle)
            .connection_timeout(config.connect_timeout)
            .build(manager)
            .await
            .map_err(|e| RedisError::Connection(e.to_string()))?;

        let service = Self { config, pool };
        service.health_check().await?;

        info!(
            url = %service.config.url,
            pool_size = service.config.pool_size,
            command_timeout_ms = service.config.command_timeout.as_millis() as u64,
            "Connected to Redis lock store"
        );
        Ok(service)
    }

    /// Get the configuration.
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    async fn connection(&self) -> Result<PooledConnection<'_, RedisConnectionManager>> {
        Ok(self.pool.get().await?)
    }

    /// PING the server within the command timeout.
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: String = self
            .bounded(redis::cmd("PING").query_async(&mut *conn))
            .await
            .map_err(|e| match e {
                RedisError::Redis(e) => RedisError::Connection(e.to_string()),
                other => other,
            })?;
        Ok(())
    }

    /// Get pool statistics.
    pub fn pool_stats(&self) -> PoolStats {
        let state = self.pool.state();
        PoolStats {
            connections: state.connections,
            idle_connections: state.idle_connections,
        }
    }

    /// Get a string value.
    pub async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = self.bounded(conn.get(key)).await?;
        Ok(value)
    }

    /// `SET key value NX PX ttl`. Returns `true` when the key was created.
    ///
    /// Sub-millisecond TTLs are rounded up to one millisecond, since Redis
    /// rejects `PX 0`.
    pub async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let ttl_ms = ttl_millis(ttl);
        let mut conn = self.connection().await?;

        let reply: Option<String> = self
            .bounded(
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl_ms)
                    .query_async(&mut *conn),
            )
            .await?;

        trace!(key = %key, ttl_ms, created = reply.is_some(), "SET NX PX");
        Ok(reply.is_some())
    }

    /// Atomically delete `key` if and only if it currently holds `expected`.
    pub async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let deleted: i64 = self
            .bounded(
                redis::Script::new(DELETE_IF_EQUALS)
                    .key(key)
                    .arg(expected)
                    .invoke_async(&mut *conn),
            )
            .await?;

        trace!(key = %key, deleted, "compare-and-delete");
        Ok(deleted == 1)
    }

    /// Atomically reset the expiry of `key` if and only if it currently holds `expected`.
    pub async fn expire_if_equals(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool> {
        let ttl_ms = ttl_millis(ttl);
        let mut conn = self.connection().await?;
        let updated: i64 = self
            .bounded(
                redis::Script::new(EXPIRE_IF_EQUALS)
                    .key(key)
                    .arg(expected)
                    .arg(ttl_ms)
                    .invoke_async(&mut *conn),
            )
            .await?;

        trace!(key = %key, ttl_ms, updated, "compare-and-pexpire");
        Ok(updated == 1)
    }

    /// Remaining time-to-live of a key, `None` when the key is missing or persistent.
    pub async fn pttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.connection().await?;
        let ttl: i64 = self.bounded(conn.pttl(key)).await?;
        if ttl < 0 {
            Ok(None)
        } else {
            Ok(Some(Duration::from_millis(ttl as u64)))
        }
    }

    /// Run a command future under the configured command timeout.
    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.config.command_timeout, fut).await {
            Ok(result) => result.map_err(RedisError::from),
            Err(_) => Err(RedisError::Timeout),
        }
    }
}

impl std::fmt::Debug for RedisService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisService")
            .field("url", &self.config.url)
            .field("pool_size", &self.config.pool_size)
            .finish()
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Connection pool statistics.
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Total connections.
    pub connections: u32,
    /// Idle connections.
    pub idle_connections: u32,
}
