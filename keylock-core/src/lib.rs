//! Distributed Locks for Keylock
//!
//! Lease-based mutual exclusion over a shared key-value store.
//!
//! ## Features
//!
//! - **Bounded waiting** - Polls with capped backoff and always answers within the wait budget
//! - **Leases** - Records expire on the server, so a crashed holder cannot block others forever
//! - **Ownership tokens** - Only the attempt that acquired a lock can release or extend it
//! - **RAII Pattern** - Guards release on every exit path, including drop
//! - **Declarative policies** - Attach locks to named operations through configuration
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use keylock_core::*;
//! use keylock_redis::RedisConfig;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // One long-lived store handle for the whole process
//!     let store = RedisLockStore::connect(RedisConfig::from_env().build()).await?;
//!     let manager = LockManager::with_config(Arc::new(store), LockConfig::from_env().build());
//!
//!     let request = AcquisitionRequest::builder(LockIdentity::new("STUDENT_LOCK", "123")?)
//!         .wait_time(Duration::from_secs(2))
//!         .lease_time(Duration::from_secs(5))
//!         .build()?;
//!
//!     // Critical section; the lock is released whether it succeeds or fails
//!     manager
//!         .with_lock(&request, || async {
//!             println!("Lock acquired, doing work...");
//!             Ok::<_, LockError>(())
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Guards
//!
//! ```rust,ignore
//! let guard = manager.lock(&request).await?;
//! // ... work ...
//! guard.release().await?;
//! ```
//!
//! Locks are not reentrant: acquiring an identity you already hold waits
//! like any other contender.

pub mod config;
pub mod error;
pub mod guard;
pub mod identity;
pub mod manager;
pub mod policy;
pub mod request;
pub mod store;
pub mod token;

pub use config::{LockConfig, LockConfigBuilder};
pub use error::{LockError, LockResult};
pub use guard::{LockGuard, LockState};
pub use identity::{KEY_DELIMITER, LockIdentity};
pub use manager::LockManager;
pub use policy::{LockInterceptor, LockPolicies, LockPolicy, TimeUnit};
pub use request::{AcquisitionRequest, AcquisitionRequestBuilder, Backoff};
pub use store::{LockStore, MemoryLockStore, RedisLockStore};
pub use token::{LockToken, TokenGenerator};
