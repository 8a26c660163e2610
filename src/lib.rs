// Keylock - lease-based distributed locks for Rust
//
// This library provides mutual exclusion across processes and machines on top
// of a shared key-value store, with bounded waits and scoped release.

// Re-export core functionality
pub use keylock_core::*;

// Re-export the Redis client layer
pub use keylock_redis;
pub use keylock_redis::{RedisConfig, RedisConfigBuilder, RedisError, RedisService};

// Needed to implement `LockStore` for custom backends
pub use async_trait::async_trait;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        AcquisitionRequest,
        Backoff,
        LockConfig,
        LockError,
        LockGuard,
        LockIdentity,
        LockInterceptor,
        LockManager,
        LockPolicies,
        LockPolicy,
        LockResult,
        LockStore,
        MemoryLockStore,
        RedisConfig,
        RedisLockStore,
        TimeUnit,
    };
}
