//! Scripted issuer and credential helpers shared by the unit tests

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use sts_auth::{Credential, CredentialIssuer, IssueFuture};

use crate::config::EngineConfig;
use crate::engine::Shared;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IssuerMode {
    Ok,
    NetworkDown,
    Unauthorized,
}

/// Issuer that returns `ASIA0001`, `ASIA0002`, ... instantly, or fails on demand.
pub(crate) struct FakeIssuer {
    calls: AtomicUsize,
    mode: Mutex<IssuerMode>,
    fail_next: AtomicUsize,
    validity: Duration,
}

impl FakeIssuer {
    pub(crate) fn new() -> Self {
        Self::with_validity(Duration::from_secs(900))
    }

    pub(crate) fn with_validity(validity: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            mode: Mutex::new(IssuerMode::Ok),
            fail_next: AtomicUsize::new(0),
            validity,
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn set_mode(&self, mode: IssuerMode) {
        *self.mode.lock().unwrap() = mode;
    }

    /// Fail the next `n` calls with a network error, then resume the current mode.
    pub(crate) fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }
}

impl CredentialIssuer for FakeIssuer {
    fn issue(&self) -> IssueFuture<'_> {
        Box::pin(async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let scripted_failure = self
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            let mode = if scripted_failure {
                IssuerMode::NetworkDown
            } else {
                *self.mode.lock().unwrap()
            };
            match mode {
                IssuerMode::Ok => Ok(Credential::new(
                    format!("ASIA{n:04}"),
                    format!("secret-{n}"),
                    format!("token-{n}"),
                    self.validity,
                )),
                IssuerMode::NetworkDown => {
                    Err(sts_auth::Error::Http("connection refused".into()))
                }
                IssuerMode::Unauthorized => Err(sts_auth::Error::Unauthorized(
                    "403 AccessDenied".into(),
                )),
            }
        })
    }

    fn validity(&self) -> Duration {
        self.validity
    }
}

/// Credential issued now, expiring after `lifetime`.
pub(crate) fn credential(id: &str, lifetime: Duration) -> Arc<Credential> {
    Arc::new(Credential::new(id, format!("secret-{id}"), format!("token-{id}"), lifetime))
}

pub(crate) fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

/// Engine internals without background tasks, for driving single ticks.
pub(crate) fn shared(config: EngineConfig, issuer: Arc<FakeIssuer>) -> Arc<Shared> {
    Arc::new(Shared::new(config, issuer))
}
