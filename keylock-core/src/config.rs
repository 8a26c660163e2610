//! Lock manager configuration.

use crate::request::Backoff;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lock manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// Namespace prepended to every composed key (`<prefix>:<category>:<field>`).
    #[serde(default)]
    pub key_prefix: Option<String>,
    /// Owner identity embedded in tokens. Defaults to `<hostname>-<pid>`.
    #[serde(default)]
    pub owner: Option<String>,
    /// Wait budget used by declarative policies that leave it unset.
    #[serde(with = "millis_serde", default = "default_wait_time")]
    pub default_wait_time: Duration,
    /// Lease used by declarative policies that leave it unset.
    #[serde(with = "millis_serde", default = "default_lease_time")]
    pub default_lease_time: Duration,
    /// Delay policy between acquisition attempts.
    #[serde(default)]
    pub backoff: Backoff,
}

fn default_wait_time() -> Duration {
    Duration::ZERO
}

fn default_lease_time() -> Duration {
    Duration::from_secs(30)
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            key_prefix: None,
            owner: None,
            default_wait_time: default_wait_time(),
            default_lease_time: default_lease_time(),
            backoff: Backoff::default(),
        }
    }
}

impl LockConfig {
    /// Create a builder.
    pub fn builder() -> LockConfigBuilder {
        LockConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    ///
    /// - `KEYLOCK_KEY_PREFIX`
    /// - `KEYLOCK_OWNER`
    /// - `KEYLOCK_WAIT_TIME_MS`
    /// - `KEYLOCK_LEASE_TIME_MS`
    /// - `KEYLOCK_POLL_INTERVAL_MS` (initial delay)
    /// - `KEYLOCK_MAX_POLL_INTERVAL_MS` (cap; equal to the initial delay gives a fixed interval)
    pub fn from_env() -> LockConfigBuilder {
        let mut builder = LockConfigBuilder::new();

        if let Ok(prefix) = std::env::var("KEYLOCK_KEY_PREFIX") {
            builder = builder.key_prefix(prefix);
        }

        if let Ok(owner) = std::env::var("KEYLOCK_OWNER") {
            builder = builder.owner(owner);
        }

        if let Some(wait) = env_millis("KEYLOCK_WAIT_TIME_MS") {
            builder = builder.default_wait_time(wait);
        }

        if let Some(lease) = env_millis("KEYLOCK_LEASE_TIME_MS") {
            builder = builder.default_lease_time(lease);
        }

        let poll = env_millis("KEYLOCK_POLL_INTERVAL_MS");
        let max_poll = env_millis("KEYLOCK_MAX_POLL_INTERVAL_MS");
        if poll.is_some() || max_poll.is_some() {
            let (default_initial, default_max) = match Backoff::default() {
                Backoff::Exponential { initial, max, .. } => (initial, max),
                Backoff::Fixed { interval } => (interval, interval),
            };
            let initial = poll.unwrap_or(default_initial);
            let max = max_poll.unwrap_or(default_max.max(initial));
            builder = if initial >= max {
                builder.backoff(Backoff::fixed(initial))
            } else {
                builder.backoff(Backoff::exponential(initial, max))
            };
        }

        builder
    }
}

fn env_millis(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Builder for lock configuration.
#[derive(Default)]
pub struct LockConfigBuilder {
    config: LockConfig,
}

impl LockConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: LockConfig::default(),
        }
    }

    /// Set the key prefix.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = Some(prefix.into());
        self
    }

    /// Set the token owner identity.
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.config.owner = Some(owner.into());
        self
    }

    /// Set the default wait budget.
    pub fn default_wait_time(mut self, wait: Duration) -> Self {
        self.config.default_wait_time = wait;
        self
    }

    /// Set the default lease.
    pub fn default_lease_time(mut self, lease: Duration) -> Self {
        self.config.default_lease_time = lease;
        self
    }

    /// Set the backoff policy.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> LockConfig {
        self.config
    }
}

pub(crate) mod millis_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
