//! Lock manager: acquisition polling, release and lease extension

use crate::config::LockConfig;
use crate::error::{LockError, LockResult};
use crate::guard::{LockGuard, LockState};
use crate::identity::LockIdentity;
use crate::request::AcquisitionRequest;
use crate::store::LockStore;
use crate::token::{self, LockToken, TokenGenerator};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Acquires and releases lease-based locks held in a shared store.
///
/// The manager owns no lock state of its own: mutual exclusion comes entirely
/// from the store's atomic `set_if_absent` / `delete_if_equals`. Cloning is
/// cheap and clones share the store handle and token generator.
///
/// Locks are not reentrant. A second acquire of an identity the caller
/// already holds is treated like any competing attempt and waits or fails.
///
/// # Examples
///
/// ```rust
/// use keylock_core::*;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let manager = LockManager::new(Arc::new(MemoryLockStore::new()));
/// let identity = LockIdentity::new("STUDENT_LOCK", "123")?;
///
/// let request = AcquisitionRequest::new(identity, Duration::from_secs(5));
/// let total = manager
///     .with_lock(&request, || async { Ok::<_, LockError>(40 + 2) })
///     .await?;
/// assert_eq!(total, 42);
/// # Ok::<(), LockError>(())
/// # }).unwrap();
/// ```
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn LockStore>,
    tokens: Arc<TokenGenerator>,
    config: Arc<LockConfig>,
}

impl LockManager {
    /// Create a manager with the default configuration.
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self::with_config(store, LockConfig::default())
    }

    /// Create a manager with an explicit configuration.
    pub fn with_config(store: Arc<dyn LockStore>, config: LockConfig) -> Self {
        let tokens = match &config.owner {
            Some(owner) => TokenGenerator::new(owner.clone()),
            None => TokenGenerator::default(),
        };

        debug!(
            store = store.store_type(),
            owner = tokens.owner(),
            prefix = ?config.key_prefix,
            "Created lock manager"
        );

        Self {
            store,
            tokens: Arc::new(tokens),
            config: Arc::new(config),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Owner identity embedded in minted tokens
    pub fn owner(&self) -> &str {
        self.tokens.owner()
    }

    /// Store key for `identity`, including the configured prefix.
    pub fn key(&self, identity: &LockIdentity) -> String {
        identity.key_with_prefix(self.config.key_prefix.as_deref())
    }

    /// Request for `identity` using the configured default wait, lease and backoff.
    pub fn request(&self, identity: LockIdentity) -> AcquisitionRequest {
        AcquisitionRequest::new(identity, self.config.default_lease_time)
            .with_wait_time(self.config.default_wait_time)
            .with_backoff(self.config.backoff)
    }

    /// Try to acquire the lock, polling until `wait_time` elapses.
    ///
    /// Returns `Some(token)` on success and `None` when the wait budget ran
    /// out; contention is a normal outcome, not an error. A zero `wait_time`
    /// makes exactly one attempt. Every retry reuses the same token.
    ///
    /// # Errors
    ///
    /// [`LockError::InvalidArgument`] before any store call if the request is
    /// malformed; store errors as they occur.
    pub async fn acquire(&self, request: &AcquisitionRequest) -> LockResult<Option<LockToken>> {
        request.validate()?;

        let key = self.key(&request.identity);
        let token = self.tokens.mint();
        let start = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            if self
                .store
                .set_if_absent(&key, token.as_str(), request.lease_time)
                .await?
            {
                info!(
                    key = %key,
                    attempts = attempt + 1,
                    lease_ms = request.lease_time.as_millis() as u64,
                    "Acquired lock"
                );
                return Ok(Some(token));
            }

            let elapsed = start.elapsed();
            if elapsed >= request.wait_time {
                debug!(
                    key = %key,
                    attempts = attempt + 1,
                    waited_ms = elapsed.as_millis() as u64,
                    "Lock unavailable (already held)"
                );
                return Ok(None);
            }

            // Never sleep past the deadline; one last attempt happens there
            let delay = request
                .backoff
                .delay(attempt)
                .min(request.wait_time - elapsed);
            trace!(key = %key, attempt, delay_ms = delay.as_millis() as u64, "Lock held, retrying");
            attempt = attempt.saturating_add(1);
            tokio::time::sleep(delay).await;
        }
    }

    /// Single acquisition attempt with no waiting.
    pub async fn try_acquire(
        &self,
        identity: &LockIdentity,
        lease_time: Duration,
    ) -> LockResult<Option<LockToken>> {
        self.acquire(&AcquisitionRequest::new(identity.clone(), lease_time))
            .await
    }

    /// Acquire and wrap the token in a [`LockGuard`].
    ///
    /// # Errors
    ///
    /// [`LockError::Unavailable`] if the wait budget ran out.
    pub async fn lock(&self, request: &AcquisitionRequest) -> LockResult<LockGuard> {
        let key = self.key(&request.identity);
        trace!(key = %key, from = %LockState::Idle, to = %LockState::Acquiring, "Lock state transition");

        match self.acquire(request).await? {
            Some(token) => Ok(LockGuard::new(
                self.clone(),
                request.identity.clone(),
                token,
                request.lease_time,
            )),
            None => {
                trace!(key = %key, from = %LockState::Acquiring, to = %LockState::Unavailable, "Lock state transition");
                Err(LockError::unavailable(key, request.wait_time))
            }
        }
    }

    /// Release the lock if `token` still owns it.
    ///
    /// Returns `false` when the record is gone or carries another token (the
    /// lease expired and was possibly re-acquired). That is logged, never
    /// forced: deleting anyway could break another holder's valid lease.
    pub async fn release(&self, identity: &LockIdentity, token: &LockToken) -> LockResult<bool> {
        let key = self.key(identity);
        let released = self.store.delete_if_equals(&key, token.as_str()).await?;

        if released {
            debug!(key = %key, "Released lock");
        } else {
            warn!(
                key = %key,
                "Failed to release lock (not held or lease expired); consider a longer lease"
            );
        }

        Ok(released)
    }

    /// Reset the lease of a held lock to `lease_time` from now.
    ///
    /// Returns `false` when `token` no longer owns the record.
    pub async fn extend(
        &self,
        identity: &LockIdentity,
        token: &LockToken,
        lease_time: Duration,
    ) -> LockResult<bool> {
        if lease_time.is_zero() {
            return Err(LockError::invalid("lease_time must be greater than zero"));
        }

        let key = self.key(identity);
        let extended = self
            .store
            .expire_if_equals(&key, token.as_str(), lease_time)
            .await?;

        if extended {
            debug!(key = %key, lease_ms = lease_time.as_millis() as u64, "Extended lock lease");
        } else {
            warn!(key = %key, "Failed to extend lock lease (not held or lease expired)");
        }

        Ok(extended)
    }

    /// Whether any live record exists for `identity`.
    pub async fn is_locked(&self, identity: &LockIdentity) -> LockResult<bool> {
        Ok(self.store.get(&self.key(identity)).await?.is_some())
    }

    /// Owner of the current holder, if any. Diagnostics only.
    ///
    /// Only the owner part of the stored token is returned, so the answer
    /// cannot be used to release or extend someone else's lock.
    pub async fn holder(&self, identity: &LockIdentity) -> LockResult<Option<String>> {
        let value = self.store.get(&self.key(identity)).await?;
        Ok(value.map(|raw| token::owner_of(&raw).to_string()))
    }

    /// Run `section` while holding the lock.
    ///
    /// The section runs at most once, and only after a successful acquire.
    /// The lock is released after it completes whether it returned `Ok` or
    /// `Err`; a release failure is logged and never replaces the section's
    /// result. Lock errors reach the caller through `E: From<LockError>`.
    pub async fn with_lock<F, Fut, T, E>(&self, request: &AcquisitionRequest, section: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let guard = self.lock(request).await?;
        let result = section().await;

        let key = guard.key().to_string();
        match guard.release().await {
            // `release` already logged the lost lease
            Ok(()) | Err(LockError::ReleaseMismatch { .. }) => {}
            Err(e) => warn!(key = %key, error = %e, "Lock release failed after critical section"),
        }

        result
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("store", &self.store.store_type())
            .field("owner", &self.tokens.owner())
            .field("config", &self.config)
            .finish()
    }
}
