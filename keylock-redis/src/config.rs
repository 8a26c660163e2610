//! Settings for the Redis-backed lock store.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::{RedisError, Result};

/// Settings for the Redis server that holds lock records.
///
/// Credentials and the database live in their own fields and are merged into
/// the URL by [`RedisConfig::connection_url`]. Every lock primitive is a single
/// round trip, so the pool can stay small and `command_timeout` should sit well
/// below the shortest lease in use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Server address, `redis://host:port` or `rediss://host:port`.
    pub url: String,
    /// Database number.
    pub database: Option<u8>,
    /// Username for Redis 6+ ACL.
    pub username: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Force TLS even when `url` uses the `redis://` scheme.
    pub tls: bool,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// Connections kept open while idle.
    pub min_idle: Option<u32>,
    /// Time allowed to open a connection or wait for a free one.
    #[serde(rename = "connect_timeout_ms", with = "millis")]
    pub connect_timeout: Duration,
    /// Bound on one lock primitive (`SET NX PX`, compare-and-delete,
    /// compare-and-expire). An exceeded bound surfaces as
    /// [`RedisError::Timeout`] instead of stalling a waiter past its budget.
    #[serde(rename = "command_timeout_ms", with = "millis")]
    pub command_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            database: None,
            username: None,
            password: None,
            tls: false,
            pool_size: 8,
            min_idle: None,
            connect_timeout: Duration::from_secs(2),
            command_timeout: Duration::from_millis(500),
        }
    }
}

impl RedisConfig {
    /// Settings for the server at `url`, defaults elsewhere.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Create a builder.
    pub fn builder() -> RedisConfigBuilder {
        RedisConfigBuilder::default()
    }

    /// Builder seeded from the environment.
    ///
    /// Reads `REDIS_URL`, `REDIS_DATABASE`, `REDIS_USERNAME`, `REDIS_PASSWORD`,
    /// `REDIS_TLS`, `REDIS_POOL_SIZE`, `REDIS_CONNECT_TIMEOUT_MS` and
    /// `REDIS_COMMAND_TIMEOUT_MS`. Unset, blank or unparsable values keep the
    /// default.
    pub fn from_env() -> RedisConfigBuilder {
        let mut config = RedisConfig::default();

        if let Some(url) = env_var("REDIS_URL") {
            config.url = url;
        }
        config.database = env_parse("REDIS_DATABASE").or(config.database);
        config.username = env_var("REDIS_USERNAME").or(config.username);
        config.password = env_var("REDIS_PASSWORD").or(config.password);
        config.tls = env_var("REDIS_TLS").is_some_and(|v| is_truthy(&v));
        config.pool_size = env_parse("REDIS_POOL_SIZE").unwrap_or(config.pool_size);
        if let Some(ms) = env_parse("REDIS_CONNECT_TIMEOUT_MS") {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse("REDIS_COMMAND_TIMEOUT_MS") {
            config.command_timeout = Duration::from_millis(ms);
        }

        RedisConfigBuilder { config }
    }

    /// Reject settings the pool or the lock primitives cannot work with.
    pub fn validate(&self) -> Result<()> {
        match self.url.split_once("://") {
            Some(("redis" | "rediss", address)) if !address.is_empty() => {}
            _ => {
                return Err(RedisError::Config(format!(
                    "unsupported Redis URL `{}` (expected redis:// or rediss://)",
                    self.url
                )));
            }
        }
        if self.pool_size == 0 {
            return Err(RedisError::Config("pool_size must be at least 1".into()));
        }
        if let Some(min_idle) = self.min_idle
            && min_idle > self.pool_size
        {
            return Err(RedisError::Config(format!(
                "min_idle ({min_idle}) exceeds pool_size ({})",
                self.pool_size
            )));
        }
        if self.connect_timeout.is_zero() || self.command_timeout.is_zero() {
            return Err(RedisError::Config("timeouts must be greater than zero".into()));
        }
        Ok(())
    }

    /// URL handed to the client, with TLS, credentials and database applied.
    pub fn connection_url(&self) -> String {
        let (secure, address) = match self.url.split_once("://") {
            Some((scheme, address)) => (scheme == "rediss", address),
            None => (false, self.url.as_str()),
        };
        let scheme = if secure || self.tls { "rediss" } else { "redis" };

        let auth = match (&self.username, &self.password) {
            (Some(user), Some(password)) => format!("{user}:{password}@"),
            (None, Some(password)) => format!(":{password}@"),
            (Some(user), None) => format!("{user}@"),
            (None, None) => String::new(),
        };

        let mut url = format!("{scheme}://{auth}{address}");
        if let Some(db) = self.database
            && !address.contains('/')
        {
            url.push_str(&format!("/{db}"));
        }
        url
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env_var(name)?.trim().parse().ok()
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Builder for [`RedisConfig`].
#[derive(Debug, Default)]
pub struct RedisConfigBuilder {
    config: RedisConfig,
}

impl RedisConfigBuilder {
    /// Server address.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Database number.
    pub fn database(mut self, db: u8) -> Self {
        self.config.database = Some(db);
        self
    }

    /// ACL username.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self
    }

    /// Password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Connect over TLS. Applied when the URL is built, so call order does not matter.
    pub fn tls(mut self, enabled: bool) -> Self {
        self.config.tls = enabled;
        self
    }

    /// Maximum pooled connections.
    pub fn pool_size(mut self, size: u32) -> Self {
        self.config.pool_size = size;
        self
    }

    /// Connections kept open while idle.
    pub fn min_idle(mut self, min_idle: u32) -> Self {
        self.config.min_idle = Some(min_idle);
        self
    }

    /// Time allowed to open or check out a connection.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Bound on a single lock primitive.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Finish building. Validation happens when the service connects.
    pub fn build(self) -> RedisConfig {
        self.config
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
