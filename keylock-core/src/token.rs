//! Lock tokens

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Opaque value proving which acquisition attempt owns a lock record.
///
/// Only [`TokenGenerator::mint`] creates tokens, so a token can be obtained
/// solely by acquiring a lock. Reading a record through
/// [`LockManager::holder`](crate::LockManager::holder) yields the owner, never
/// a value that could be turned back into a token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LockToken(String);

impl LockToken {
    /// Raw value as stored in the lock record
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Owner part of the token
    pub fn owner(&self) -> &str {
        owner_of(&self.0)
    }

    /// Consume into the raw value
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owner part of a stored `<owner>:<sequence>:<uuid>` value.
///
/// Values not minted by a [`TokenGenerator`] report `"unknown"`.
pub(crate) fn owner_of(raw: &str) -> &str {
    let mut parts = raw.rsplitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(_), Some(owner)) if !owner.is_empty() => owner,
        _ => "unknown",
    }
}

/// Mints tokens of the form `<owner>:<sequence>:<uuid>`.
///
/// The owner and sequence make a token readable in the store (who holds it,
/// which attempt); the random UUID keeps it unique across restarts.
#[derive(Debug)]
pub struct TokenGenerator {
    owner: String,
    sequence: AtomicU64,
}

impl TokenGenerator {
    /// Create a generator for the given owner identity.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Owner identity derived from the host and process.
    pub fn default_owner() -> String {
        let host = std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| "local".to_string());
        format!("{}-{}", host, std::process::id())
    }

    /// Owner identity embedded in every token
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Mint a fresh token for one acquisition attempt.
    pub fn mint(&self) -> LockToken {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        LockToken(format!(
            "{}:{}:{}",
            self.owner,
            seq,
            Uuid::new_v4().simple()
        ))
    }
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new(Self::default_owner())
    }
}
