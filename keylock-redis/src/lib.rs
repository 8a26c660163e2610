//! # Keylock Redis
//!
//! Redis plumbing for keylock: connection settings and a pooled service
//! exposing the atomic conditional operations lease-based lock records are
//! built from.
//!
//! ## Features
//!
//! - **Connection Pooling**: bb8 pool, checked with a PING on connect
//! - **Conditional writes**: `SET NX PX`, compare-and-delete and
//!   compare-and-expire executed atomically on the server
//! - **Bounded commands**: every command runs under the configured timeout
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use keylock_redis::{RedisConfig, RedisService};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisConfig::builder()
//!         .url("redis://localhost:6379")
//!         .command_timeout(Duration::from_millis(250))
//!         .build();
//!
//!     let redis = RedisService::new(config).await?;
//!
//!     if redis.set_nx_px("jobs:nightly", "token-1", Duration::from_secs(30)).await? {
//!         // ... work ...
//!         redis.delete_if_equals("jobs:nightly", "token-1").await?;
//!     }
//!
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod service;

pub use config::{RedisConfig, RedisConfigBuilder};
pub use error::{RedisError, Result};
pub use service::{PoolStats, RedisService};

// Re-export redis crate for convenience
pub use redis;

/// Prelude for common imports.
///
/// ```
/// use keylock_redis::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{RedisConfig, RedisConfigBuilder};
    pub use crate::error::{RedisError, Result};
    pub use crate::service::RedisService;
}
