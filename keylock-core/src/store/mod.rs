//! Lock record storage backends
//!
//! The authoritative lock state lives in a shared key-value store. A backend
//! only needs atomic conditional primitives and per-key expiry:
//!
//! - **Memory**: In-memory storage using DashMap (single process, tests)
//! - **Redis**: `SET NX PX` plus Lua compare-and-delete, shared across machines
//!
//! Unconditional writes or deletes of a lock key are never issued; they would
//! break the token-based ownership proof.

mod memory;
mod redis;

pub use self::redis::RedisLockStore;
pub use memory::MemoryLockStore;

use crate::error::{LockError, LockResult};
use async_trait::async_trait;
use std::time::Duration;

/// Atomic primitives a lock store must provide.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Create `key = value` with expiry `ttl` unless a live record exists.
    /// Returns `true` when the record was created.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LockResult<bool>;

    /// Delete `key` only if its live value equals `expected`.
    /// Returns `true` when a record was deleted.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> LockResult<bool>;

    /// Current live value of `key`.
    async fn get(&self, key: &str) -> LockResult<Option<String>>;

    /// Reset the expiry of `key` to `ttl` only if its live value equals `expected`.
    ///
    /// Optional: stores without compare-and-expire report a store error.
    async fn expire_if_equals(&self, key: &str, expected: &str, ttl: Duration) -> LockResult<bool> {
        let _ = (key, expected, ttl);
        Err(LockError::store(format!(
            "lease extension is not supported by the {} store",
            self.store_type()
        )))
    }

    /// Get store type name for debugging
    fn store_type(&self) -> &'static str;
}
