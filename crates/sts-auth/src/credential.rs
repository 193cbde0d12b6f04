//! Short-lived credential value and the issuer contract
//!
//! A `Credential` is immutable once issued. Its expiry is recorded on the
//! monotonic tokio clock so rotation decisions are immune to wall-clock jumps
//! and can be driven by a paused clock in tests.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, SystemTime};

use common::Secret;
use tokio::time::Instant;

use crate::error::Result;

/// One issued access triple plus its absolute expiry.
///
/// `expires_at` is fixed at construction to `issued_at + lifetime` and has no
/// setter. The engine shares credentials behind `Arc`, so a credential handed
/// to a consumer can never change under it.
#[derive(Debug)]
pub struct Credential {
    access_key_id: String,
    secret_access_key: Secret<String>,
    session_token: Secret<String>,
    issued_at: Instant,
    expires_at: Instant,
}

impl Credential {
    /// Build a credential issued now and valid for `lifetime`.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
        lifetime: Duration,
    ) -> Self {
        Self::issued(
            access_key_id,
            secret_access_key,
            session_token,
            Instant::now(),
            lifetime,
        )
    }

    /// Build a credential issued at `issued_at` and valid for `lifetime`.
    pub fn issued(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
        issued_at: Instant,
        lifetime: Duration,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: Secret::new(secret_access_key.into()),
            session_token: Secret::new(session_token.into()),
            issued_at,
            expires_at: issued_at + lifetime,
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &Secret<String> {
        &self.secret_access_key
    }

    pub fn session_token(&self) -> &Secret<String> {
        &self.session_token
    }

    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Validity left at `now`; zero once expired.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }

    /// Whether the credential has expired at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.remaining(now).is_zero()
    }

    /// Expiry projected onto the wall clock, for display only.
    pub fn expires_at_wall(&self) -> SystemTime {
        SystemTime::now() + self.remaining(Instant::now())
    }
}

/// Boxed future returned by `CredentialIssuer::issue`.
pub type IssueFuture<'a> = Pin<Box<dyn Future<Output = Result<Credential>> + Send + 'a>>;

/// Source of fresh short-lived credentials.
///
/// Each `issue()` call performs one outbound exchange and either returns a
/// credential valid for `validity()` or an error. Implementations never retry.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn CredentialIssuer>`).
pub trait CredentialIssuer: Send + Sync {
    /// Exchange the configured identity for one new credential.
    fn issue(&self) -> IssueFuture<'_>;

    /// Validity window of every credential this issuer returns.
    fn validity(&self) -> Duration;
}
