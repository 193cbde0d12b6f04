//! Bounded pool of prefetched credentials
//!
//! Holds issued credentials that are not yet active. Selection is greedy by
//! urgency: among credentials whose remaining validity clears the requested
//! minimum, the one expiring soonest is taken first, so the least remaining
//! validity is wasted across the whole pool.
//!
//! The pool itself is not synchronized. The engine keeps it behind the same
//! mutex as the active slot, which makes take-and-activate atomic.

use std::sync::Arc;
use std::time::Duration;

use sts_auth::Credential;
use tokio::time::Instant;

/// Unordered multiset of pooled credentials, bounded by `capacity`.
#[derive(Debug)]
pub struct CredentialPool {
    entries: Vec<Arc<Credential>>,
    capacity: usize,
}

impl CredentialPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Add a credential. Returns `false` and drops it when the pool is full.
    pub fn push(&mut self, credential: Arc<Credential>) -> bool {
        if self.is_full() {
            return false;
        }
        self.entries.push(credential);
        true
    }

    /// Remove and return the earliest-expiring credential whose remaining
    /// validity at `now` exceeds `min_remaining`.
    ///
    /// Ties go to the credential pooled first.
    pub fn try_take_valid(
        &mut self,
        now: Instant,
        min_remaining: Duration,
    ) -> Option<Arc<Credential>> {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, c)| c.remaining(now) > min_remaining)
            .min_by_key(|(_, c)| c.expires_at())
            .map(|(idx, _)| idx)?;
        Some(self.entries.remove(idx))
    }

    /// Remove and return the credential with the latest expiry.
    pub fn take_freshest(&mut self) -> Option<Arc<Credential>> {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .max_by_key(|(_, c)| c.expires_at())
            .map(|(idx, _)| idx)?;
        Some(self.entries.remove(idx))
    }

    /// Discard credentials that have expired at `now`. Returns how many.
    pub fn prune_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|c| !c.is_expired(now));
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Credential>> {
        self.entries.iter()
    }

    /// Whether this exact credential instance is pooled.
    pub fn contains(&self, credential: &Arc<Credential>) -> bool {
        self.entries.iter().any(|c| Arc::ptr_eq(c, credential))
    }
}
