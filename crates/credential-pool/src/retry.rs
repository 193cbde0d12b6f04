//! Bounded retry with exponential backoff around issuer calls
//!
//! Used where a single transient failure would otherwise abort startup or
//! leave a stale credential published: startup, the rotation fallback and
//! manual rotation. Background replenishment does not retry; its next
//! interval is the retry.

use std::time::Duration;

use sts_auth::{Credential, CredentialIssuer};
use tracing::{debug, warn};

/// Retry policy for issuer calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    /// Backoff growth factor per attempt
    pub multiplier: u32,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            multiplier: 2,
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt + 1` (0-based), capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .checked_mul(self.multiplier.saturating_pow(attempt))
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Issue a credential, retrying retryable failures per `policy`.
///
/// Non-retryable errors (rejected keys, malformed responses) return after the
/// first attempt. `path` labels logs and the failure counter.
pub async fn issue_with_retry(
    issuer: &dyn CredentialIssuer,
    policy: &RetryPolicy,
    path: &'static str,
) -> sts_auth::Result<Credential> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match issuer.issue().await {
            Ok(credential) => return Ok(credential),
            Err(e) => {
                attempt += 1;
                metrics::counter!(
                    "credential_issue_failures_total",
                    "path" => path,
                    "kind" => e.label()
                )
                .increment(1);

                if !e.is_retryable() || attempt >= attempts {
                    warn!(path, attempt, error = %e, "credential issuance failed");
                    return Err(e);
                }

                let delay = policy.backoff(attempt - 1);
                warn!(
                    path,
                    attempt,
                    max_attempts = attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "credential issuance failed, retrying"
                );
                tokio::time::sleep(delay).await;
                debug!(path, attempt = attempt + 1, "retrying credential issuance");
            }
        }
    }
}
