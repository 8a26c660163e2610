//! Scoped lock guards

use crate::error::{LockError, LockResult};
use crate::identity::LockIdentity;
use crate::manager::LockManager;
use crate::token::LockToken;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Lifecycle of one scoped acquisition.
///
/// `IDLE -> ACQUIRING -> {HELD -> RELEASING -> RELEASED} | UNAVAILABLE`.
/// `Released` and `Unavailable` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockState {
    /// Nothing attempted yet
    Idle,
    /// Polling the store
    Acquiring,
    /// Record created with our token
    Held,
    /// Compare-and-delete in flight
    Releasing,
    /// Release attempted; the guard no longer owns a token
    Released,
    /// Wait budget exhausted without acquiring
    Unavailable,
}

impl LockState {
    /// Whether no further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Released | Self::Unavailable)
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: LockState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Acquiring)
                | (Self::Acquiring, Self::Held)
                | (Self::Acquiring, Self::Unavailable)
                | (Self::Held, Self::Releasing)
                | (Self::Releasing, Self::Released)
        )
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Acquiring => "ACQUIRING",
            Self::Held => "HELD",
            Self::Releasing => "RELEASING",
            Self::Released => "RELEASED",
            Self::Unavailable => "UNAVAILABLE",
        };
        f.write_str(name)
    }
}

/// Lock guard that releases the lock exactly once.
///
/// Call [`LockGuard::release`] to release and observe the outcome. A guard
/// dropped while still held (early return, panic, cancelled future) spawns a
/// best-effort release on the current Tokio runtime; without a runtime the
/// record is left to expire with its lease.
pub struct LockGuard {
    manager: LockManager,
    identity: LockIdentity,
    key: String,
    token: Option<LockToken>,
    lease_time: Duration,
    acquired_at: DateTime<Utc>,
    state: LockState,
}

impl LockGuard {
    pub(crate) fn new(
        manager: LockManager,
        identity: LockIdentity,
        token: LockToken,
        lease_time: Duration,
    ) -> Self {
        let key = manager.key(&identity);
        Self {
            manager,
            identity,
            key,
            token: Some(token),
            lease_time,
            acquired_at: Utc::now(),
            state: LockState::Held,
        }
    }

    /// Identity of the held lock
    pub fn identity(&self) -> &LockIdentity {
        &self.identity
    }

    /// Composed store key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Token proving ownership, `None` once released
    pub fn token(&self) -> Option<&LockToken> {
        self.token.as_ref()
    }

    /// Lease requested at acquisition or by the last extension
    pub fn lease_time(&self) -> Duration {
        self.lease_time
    }

    /// Wall-clock acquisition time
    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Current lifecycle state
    pub fn state(&self) -> LockState {
        self.state
    }

    /// Whether the guard still owns a token
    pub fn is_held(&self) -> bool {
        self.state == LockState::Held
    }

    /// Reset the lease to `lease_time` from now.
    ///
    /// Returns `false` when the record no longer carries our token, i.e. the
    /// lease already expired and was possibly taken over.
    pub async fn extend(&mut self, lease_time: Duration) -> LockResult<bool> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| LockError::ReleaseMismatch {
                key: self.key.clone(),
            })?;
        let extended = self.manager.extend(&self.identity, token, lease_time).await?;
        if extended {
            self.lease_time = lease_time;
        }
        Ok(extended)
    }

    /// Release the lock.
    ///
    /// # Errors
    ///
    /// [`LockError::ReleaseMismatch`] if the record no longer carried our
    /// token, or a store error. Either way the guard is spent.
    pub async fn release(mut self) -> LockResult<()> {
        self.release_internal().await
    }

    async fn release_internal(&mut self) -> LockResult<()> {
        let Some(token) = self.token.clone() else {
            return Ok(());
        };

        self.transition(LockState::Releasing);
        let result = self.manager.release(&self.identity, &token).await;
        self.token = None;
        self.transition(LockState::Released);

        match result {
            Ok(true) => Ok(()),
            Ok(false) => Err(LockError::ReleaseMismatch {
                key: self.key.clone(),
            }),
            Err(e) => Err(e),
        }
    }

    fn transition(&mut self, next: LockState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal lock state transition {} -> {}",
            self.state,
            next
        );
        debug!(key = %self.key, from = %self.state, to = %next, "Lock state transition");
        self.state = next;
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let manager = self.manager.clone();
                let identity = self.identity.clone();
                let key = self.key.clone();
                debug!(key = %key, "Releasing dropped lock guard");

                handle.spawn(async move {
                    if let Err(e) = manager.release(&identity, &token).await {
                        warn!(key = %key, error = %e, "Failed to release dropped lock guard");
                    }
                });
            }
            Err(_) => {
                warn!(
                    key = %self.key,
                    "Lock guard dropped outside a Tokio runtime; record will expire with its lease"
                );
            }
        }
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("state", &self.state)
            .field("lease_time", &self.lease_time)
            .field("acquired_at", &self.acquired_at)
            .finish()
    }
}
