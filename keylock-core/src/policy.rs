//! Declarative lock policies
//!
//! A [`LockPolicy`] describes, per protected operation, which lock to take
//! and how long to wait and lease it. [`LockInterceptor`] wraps calls with
//! the matching policy, so call sites declare *what* is protected while the
//! manager decides *how*.
//!
//! ```rust
//! use keylock_core::*;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let policies = LockPolicies::from_json(r#"{
//!     "enroll_student": {
//!         "lock_category": "STUDENT_LOCK",
//!         "lock_field": "123",
//!         "wait_time": 0,
//!         "lease_time": 5,
//!         "time_unit": "SECONDS"
//!     }
//! }"#)?;
//!
//! let manager = LockManager::new(Arc::new(MemoryLockStore::new()));
//! let interceptor = LockInterceptor::new(manager, policies);
//!
//! let enrolled = interceptor
//!     .run("enroll_student", || async { Ok::<_, LockError>(true) })
//!     .await?;
//! assert!(enrolled);
//! # Ok::<(), LockError>(())
//! # }).unwrap();
//! ```

use crate::config::LockConfig;
use crate::error::{LockError, LockResult};
use crate::identity::LockIdentity;
use crate::manager::LockManager;
use crate::request::AcquisitionRequest;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Unit for the numeric durations of a [`LockPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeUnit {
    /// Nanoseconds
    Nanoseconds,
    /// Microseconds
    Microseconds,
    /// Milliseconds
    Milliseconds,
    /// Seconds
    #[default]
    Seconds,
    /// Minutes
    Minutes,
    /// Hours
    Hours,
    /// Days
    Days,
}

impl TimeUnit {
    /// Convert a non-negative amount to a duration, saturating on overflow.
    pub fn to_duration(self, amount: u64) -> Duration {
        match self {
            Self::Nanoseconds => Duration::from_nanos(amount),
            Self::Microseconds => Duration::from_micros(amount),
            Self::Milliseconds => Duration::from_millis(amount),
            Self::Seconds => Duration::from_secs(amount),
            Self::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            Self::Hours => Duration::from_secs(amount.saturating_mul(3_600)),
            Self::Days => Duration::from_secs(amount.saturating_mul(86_400)),
        }
    }
}

/// Lock declaration for one protected operation.
///
/// Amounts are signed so configuration mistakes surface as
/// [`LockError::InvalidArgument`] instead of parse failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPolicy {
    /// Lock category (namespace of the protected resources)
    #[serde(alias = "lock_type", alias = "lockType", alias = "lockCategory")]
    pub lock_category: String,
    /// Lock field (the specific resource)
    #[serde(alias = "lockField")]
    pub lock_field: String,
    /// How long to wait for the lock, in `time_unit`
    #[serde(default, alias = "waitTime")]
    pub wait_time: i64,
    /// Lease once acquired, in `time_unit`
    #[serde(default = "default_lease", alias = "timeout", alias = "leaseTime")]
    pub lease_time: i64,
    /// Unit for `wait_time` and `lease_time`
    #[serde(default, alias = "timeUnit")]
    pub time_unit: TimeUnit,
}

fn default_lease() -> i64 {
    30
}

impl LockPolicy {
    /// Policy with no waiting and a 30 second lease.
    pub fn new(category: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            lock_category: category.into(),
            lock_field: field.into(),
            wait_time: 0,
            lease_time: default_lease(),
            time_unit: TimeUnit::Seconds,
        }
    }

    /// Set the wait time
    pub fn wait_time(mut self, wait_time: i64) -> Self {
        self.wait_time = wait_time;
        self
    }

    /// Set the lease time
    pub fn lease_time(mut self, lease_time: i64) -> Self {
        self.lease_time = lease_time;
        self
    }

    /// Set the time unit
    pub fn time_unit(mut self, unit: TimeUnit) -> Self {
        self.time_unit = unit;
        self
    }

    /// Same policy for another resource of the category
    pub fn for_field(&self, field: impl Into<String>) -> Self {
        Self {
            lock_field: field.into(),
            ..self.clone()
        }
    }

    /// Validate and convert to a request, taking the backoff from `config`.
    pub fn to_request(&self, config: &LockConfig) -> LockResult<AcquisitionRequest> {
        let identity = LockIdentity::new(self.lock_category.as_str(), self.lock_field.as_str())?;

        if self.wait_time < 0 {
            return Err(LockError::invalid(format!(
                "wait_time must not be negative (got {})",
                self.wait_time
            )));
        }
        if self.lease_time <= 0 {
            return Err(LockError::invalid(format!(
                "lease_time must be positive (got {})",
                self.lease_time
            )));
        }

        let request = AcquisitionRequest::new(
            identity,
            self.time_unit.to_duration(self.lease_time as u64),
        )
        .with_wait_time(self.time_unit.to_duration(self.wait_time as u64))
        .with_backoff(config.backoff);

        request.validate()?;
        Ok(request)
    }
}

/// Registry of policies keyed by operation name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockPolicies {
    policies: HashMap<String, LockPolicy>,
}

impl LockPolicies {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object of `operation -> policy`.
    pub fn from_json(json: &str) -> LockResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| LockError::invalid(format!("invalid lock policy document: {}", e)))
    }

    /// Register a policy (builder style)
    pub fn with(mut self, operation: impl Into<String>, policy: LockPolicy) -> Self {
        self.insert(operation, policy);
        self
    }

    /// Register or replace a policy
    pub fn insert(&mut self, operation: impl Into<String>, policy: LockPolicy) {
        self.policies.insert(operation.into(), policy);
    }

    /// Policy for `operation`
    pub fn get(&self, operation: &str) -> Option<&LockPolicy> {
        self.policies.get(operation)
    }

    /// Number of registered operations
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether no operations are registered
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// Runs operations under the lock their policy declares.
#[derive(Debug, Clone)]
pub struct LockInterceptor {
    manager: LockManager,
    policies: LockPolicies,
}

impl LockInterceptor {
    /// Create an interceptor
    pub fn new(manager: LockManager, policies: LockPolicies) -> Self {
        Self { manager, policies }
    }

    /// Underlying manager
    pub fn manager(&self) -> &LockManager {
        &self.manager
    }

    /// Registered policies
    pub fn policies(&self) -> &LockPolicies {
        &self.policies
    }

    /// Run `section` under the policy registered for `operation`.
    pub async fn run<F, Fut, T, E>(&self, operation: &str, section: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let policy = self.lookup(operation)?;
        self.run_policy(policy, section).await
    }

    /// Run `section` under the policy for `operation`, locking `field` instead
    /// of the policy's static field.
    pub async fn run_for<F, Fut, T, E>(&self, operation: &str, field: &str, section: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let policy = self.lookup(operation)?.for_field(field);
        self.run_policy(&policy, section).await
    }

    /// Run `section` under an ad-hoc policy.
    pub async fn run_policy<F, Fut, T, E>(&self, policy: &LockPolicy, section: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let request = policy.to_request(self.manager.config())?;
        debug!(
            category = %policy.lock_category,
            field = %policy.lock_field,
            "Running operation under lock policy"
        );
        self.manager.with_lock(&request, section).await
    }

    fn lookup(&self, operation: &str) -> LockResult<&LockPolicy> {
        self.policies
            .get(operation)
            .ok_or_else(|| LockError::invalid(format!("no lock policy for operation '{}'", operation)))
    }
}
