//! Credential pooling and rotation engine
//!
//! Keeps one short-lived credential continuously valid without making the
//! consumer wait on the issuer at the moment a credential is needed. The
//! engine prefetches replacements into a bounded pool, swaps the active
//! credential just before it expires, and notifies a registered hook on every
//! swap.
//!
//! Credential lifecycle:
//! 1. `Engine::start` issues the first credential (with retry) and activates it
//! 2. The replenishment task prefetches credentials into the pool every
//!    `prefetch_interval`
//! 3. The rotation task checks the active credential every `check_interval`
//! 4. Inside `rotation_margin`, the earliest-expiring pooled credential that
//!    clears the margin replaces it; with none available the issuer is called
//! 5. `Engine::manual_rotate` forces a swap on demand
//! 6. A credential that is neither pooled nor active is dropped
//!
//! Pool and active slot live behind one async mutex, so "read candidates,
//! pick one, remove it" is atomic across the rotation task, manual rotation
//! and replenishment. Issuer calls are never made while holding it.

pub mod config;
pub mod engine;
pub mod error;
pub mod holder;
pub mod pool;
pub mod replenish;
pub mod retry;
pub mod rotation;

#[cfg(test)]
mod testing;

pub use config::{EngineConfig, ReplenishPolicy};
pub use engine::{Engine, Rotation};
pub use error::{Error, Result};
pub use holder::{ActiveCredentialHolder, ChangeHook};
pub use pool::CredentialPool;
pub use replenish::ReplenishOutcome;
pub use retry::{RetryPolicy, issue_with_retry};
pub use rotation::{RotationSource, TickOutcome, Trigger};
pub use sts_auth::{Credential, CredentialIssuer};
