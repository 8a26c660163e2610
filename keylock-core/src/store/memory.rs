//! In-memory lock store
//!
//! Uses DashMap so every primitive runs atomically under the shard lock for
//! its key. Expiry is measured on the Tokio clock, which lets tests drive
//! lease expiry with paused time. Suitable for single-process deployments
//! and as a test double; for multiple processes use the Redis store.
//!
//! Expired records are dropped when their key is next touched, and every
//! 64 newly created records trigger a full sweep, so keys that
//! are never locked again do not accumulate.

use crate::error::LockResult;
use crate::store::LockStore;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug, Clone)]
struct Record {
    value: String,
    expires_at: Instant,
}

impl Record {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Absurdly long TTLs saturate instead of overflowing the clock.
fn expiry(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .unwrap_or_else(|| now + Duration::from_secs(100 * 365 * 86_400))
}

/// Newly created records between full sweeps of expired ones.
const SWEEP_INTERVAL: u64 = 64;

/// In-memory lock store
#[derive(Debug, Default)]
pub struct MemoryLockStore {
    records: DashMap<String, Record>,
    created: AtomicU64,
}

impl MemoryLockStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.records.iter().filter(|r| r.is_live(now)).count()
    }

    /// Whether no live records exist
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired records.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.records.retain(|_, record| record.is_live(now));
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LockResult<bool> {
        let now = Instant::now();
        let record = Record {
            value: value.to_string(),
            expires_at: expiry(now, ttl),
        };

        let created = match self.records.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    false
                } else {
                    occupied.insert(record);
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                true
            }
        };

        trace!(key = %key, created, "memory set_if_absent");

        // The entry guard is released above; `retain` locks every shard.
        if created && (self.created.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_INTERVAL == 0 {
            self.purge_expired();
        }

        Ok(created)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> LockResult<bool> {
        let now = Instant::now();
        let deleted = self
            .records
            .remove_if(key, |_, record| !record.is_live(now) || record.value == expected)
            .is_some_and(|(_, record)| record.is_live(now) && record.value == expected);

        trace!(key = %key, deleted, "memory delete_if_equals");
        Ok(deleted)
    }

    async fn get(&self, key: &str) -> LockResult<Option<String>> {
        let now = Instant::now();
        let found = self
            .records
            .get(key)
            .map(|record| (record.is_live(now), record.value.clone()));

        match found {
            Some((true, value)) => Ok(Some(value)),
            Some((false, _)) => {
                self.records.remove_if(key, |_, record| !record.is_live(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn expire_if_equals(&self, key: &str, expected: &str, ttl: Duration) -> LockResult<bool> {
        let now = Instant::now();
        let updated = match self.records.get_mut(key) {
            Some(mut record) if record.is_live(now) && record.value == expected => {
                record.expires_at = expiry(now, ttl);
                true
            }
            _ => false,
        };

        trace!(key = %key, updated, "memory expire_if_equals");
        Ok(updated)
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}
