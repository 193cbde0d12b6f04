//! Periodic rotation of the active credential
//!
//! Every `check_interval` the rotation task inspects the active credential.
//! Once its remaining validity drops below `rotation_margin` it is replaced by
//! the earliest-expiring pooled credential that still clears the margin. If
//! the pool has nothing usable, the task falls back to a synchronous issuer
//! call (with retry) outside the lock.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::engine::Shared;
use crate::retry::issue_with_retry;

/// Where a newly activated credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationSource {
    Pool,
    Issuer,
}

impl RotationSource {
    pub fn label(&self) -> &'static str {
        match self {
            RotationSource::Pool => "pool",
            RotationSource::Issuer => "issuer",
        }
    }
}

/// What caused a swap of the active credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Auto,
    Manual,
}

impl Trigger {
    pub fn label(&self) -> &'static str {
        match self {
            Trigger::Startup => "startup",
            Trigger::Auto => "auto",
            Trigger::Manual => "manual",
        }
    }
}

/// Result of a single rotation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No active credential yet.
    Idle,
    /// Active credential still clears the margin.
    Healthy,
    /// Active credential was replaced.
    Rotated(RotationSource),
    /// A fallback credential was issued, but another path rotated first.
    /// The new credential went to the pool instead.
    Superseded,
    /// Fallback issuance failed; the active credential was left in place.
    Failed,
}

/// Run one rotation check.
pub(crate) async fn rotation_tick(shared: &Shared) -> TickOutcome {
    let margin = shared.config.rotation_margin;

    {
        let mut slots = shared.slots.lock().await;
        let Some(active) = slots.active.get() else {
            return TickOutcome::Idle;
        };

        let now = Instant::now();
        let pruned = slots.pool.prune_expired(now);
        if pruned > 0 {
            debug!(pruned, "dropped expired pooled credentials");
            slots.record_pool_size();
        }

        let remaining = active.remaining(now);
        if remaining >= margin {
            trace!(remaining_secs = remaining.as_secs(), "active credential healthy");
            return TickOutcome::Healthy;
        }

        if let Some(next) = slots.pool.try_take_valid(now, margin) {
            slots.install(next, Trigger::Auto, RotationSource::Pool);
            return TickOutcome::Rotated(RotationSource::Pool);
        }

        warn!(
            remaining_secs = remaining.as_secs(),
            pool_size = slots.pool.len(),
            "no pooled credential clears the rotation margin, issuing synchronously"
        );
    }

    let issued = match issue_with_retry(shared.issuer.as_ref(), &shared.config.retry, "fallback").await
    {
        Ok(credential) => Arc::new(credential),
        Err(e) => {
            error!(
                error = %e,
                "fallback issuance failed; the published credential may expire or already be invalid"
            );
            return TickOutcome::Failed;
        }
    };

    let mut slots = shared.slots.lock().await;
    let now = Instant::now();
    if let Some(current) = slots.active.get()
        && current.remaining(now) >= margin
    {
        let pooled = slots.pool.push(issued.clone());
        slots.record_pool_size();
        info!(
            access_key_id = issued.access_key_id(),
            pooled,
            "active credential was replaced during fallback issuance, keeping new credential in reserve"
        );
        return TickOutcome::Superseded;
    }

    slots.install(issued, Trigger::Auto, RotationSource::Issuer);
    TickOutcome::Rotated(RotationSource::Issuer)
}

/// Spawn the periodic rotation task.
///
/// The task exits when `cancel` fires, including mid-check; an issuer call in
/// flight at that point is abandoned.
pub(crate) fn spawn_rotation_task(shared: Arc<Shared>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(shared.config.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = rotation_tick(&shared) => {
                    trace!(?outcome, "rotation check complete");
                }
            }
        }

        debug!("rotation task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::testing::{FakeIssuer, IssuerMode, credential, secs, shared};
    use std::time::Duration;
    use sts_auth::{Credential, CredentialIssuer, IssueFuture};
    use tokio::sync::{Notify, Semaphore};

    async fn active_id(shared: &Shared) -> String {
        shared
            .slots
            .lock()
            .await
            .active
            .get()
            .unwrap()
            .access_key_id()
            .to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn tick_without_active_is_idle() {
        let issuer = Arc::new(FakeIssuer::new());
        let shared = shared(EngineConfig::default(), issuer.clone());

        assert_eq!(rotation_tick(&shared).await, TickOutcome::Idle);
        assert_eq!(issuer.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_credential_is_left_alone() {
        let issuer = Arc::new(FakeIssuer::new());
        let shared = shared(EngineConfig::default(), issuer.clone());
        {
            let mut slots = shared.slots.lock().await;
            slots.active.set(credential("active", secs(900)));
            slots.pool.push(credential("pooled", secs(900)));
        }

        assert_eq!(rotation_tick(&shared).await, TickOutcome::Healthy);
        assert_eq!(active_id(&shared).await, "active");
        assert_eq!(shared.slots.lock().await.pool.len(), 1);
        assert_eq!(issuer.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expiring_credential_takes_earliest_valid_from_pool() {
        let issuer = Arc::new(FakeIssuer::new());
        let shared = shared(EngineConfig::default(), issuer.clone());
        {
            let mut slots = shared.slots.lock().await;
            slots.active.set(credential("active", secs(20)));
            slots.pool.push(credential("c200", secs(200)));
            slots.pool.push(credential("c40", secs(40)));
        }

        assert_eq!(
            rotation_tick(&shared).await,
            TickOutcome::Rotated(RotationSource::Pool)
        );
        assert_eq!(active_id(&shared).await, "c40");

        let slots = shared.slots.lock().await;
        let left: Vec<_> = slots.pool.iter().map(|c| c.access_key_id()).collect();
        assert_eq!(left, vec!["c200"]);
        assert_eq!(issuer.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_pool_falls_back_to_single_issue() {
        let issuer = Arc::new(FakeIssuer::new());
        let shared = shared(EngineConfig::default(), issuer.clone());
        shared
            .slots
            .lock()
            .await
            .active
            .set(credential("active", secs(10)));

        assert_eq!(
            rotation_tick(&shared).await,
            TickOutcome::Rotated(RotationSource::Issuer)
        );
        assert_eq!(issuer.calls(), 1);
        assert_eq!(active_id(&shared).await, "ASIA0001");
        assert!(shared.slots.lock().await.pool.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pool_without_margin_clearing_credential_falls_back() {
        let issuer = Arc::new(FakeIssuer::new());
        let shared = shared(EngineConfig::default(), issuer.clone());
        {
            let mut slots = shared.slots.lock().await;
            slots.active.set(credential("active", secs(10)));
            slots.pool.push(credential("c25", secs(25)));
        }

        assert_eq!(
            rotation_tick(&shared).await,
            TickOutcome::Rotated(RotationSource::Issuer)
        );
        assert_eq!(issuer.calls(), 1);
        assert_eq!(shared.slots.lock().await.pool.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fallback_keeps_active_credential() {
        let issuer = Arc::new(FakeIssuer::new());
        issuer.set_mode(IssuerMode::NetworkDown);
        let shared = shared(EngineConfig::default(), issuer.clone());
        shared
            .slots
            .lock()
            .await
            .active
            .set(credential("active", secs(10)));

        assert_eq!(rotation_tick(&shared).await, TickOutcome::Failed);
        assert_eq!(issuer.calls(), 3, "fallback retries up to max_attempts");
        assert_eq!(active_id(&shared).await, "active");
    }

    #[tokio::test(start_paused = true)]
    async fn expired_pool_entries_are_pruned() {
        let issuer = Arc::new(FakeIssuer::new());
        let shared = shared(EngineConfig::default(), issuer.clone());
        {
            let mut slots = shared.slots.lock().await;
            slots.active.set(credential("active", secs(900)));
            slots.pool.push(credential("stale", secs(5)));
            slots.pool.push(credential("fresh", secs(600)));
        }
        tokio::time::advance(secs(6)).await;

        assert_eq!(rotation_tick(&shared).await, TickOutcome::Healthy);
        let slots = shared.slots.lock().await;
        let left: Vec<_> = slots.pool.iter().map(|c| c.access_key_id()).collect();
        assert_eq!(left, vec!["fresh"]);
    }

    #[tokio::test(start_paused = true)]
    async fn selection_follows_expiry_order_across_rotations() {
        let issuer = Arc::new(FakeIssuer::new());
        let shared = shared(EngineConfig::default(), issuer.clone());
        {
            let mut slots = shared.slots.lock().await;
            slots.active.set(credential("active", secs(40)));
            for (id, lifetime) in [("c300", 300), ("c100", 100), ("c200", 200)] {
                slots.pool.push(credential(id, secs(lifetime)));
            }
        }

        let mut order = Vec::new();
        for _ in 0..3 {
            // Advance until the active credential falls inside the margin.
            loop {
                if let TickOutcome::Rotated(source) = rotation_tick(&shared).await {
                    assert_eq!(source, RotationSource::Pool);
                    break;
                }
                tokio::time::advance(secs(2)).await;
            }
            order.push(active_id(&shared).await);
        }

        assert_eq!(order, vec!["c100", "c200", "c300"]);
        assert_eq!(issuer.calls(), 0);
    }

    /// Issuer that parks until the test releases it.
    struct GatedIssuer {
        entered: Notify,
        gate: Semaphore,
    }

    impl CredentialIssuer for GatedIssuer {
        fn issue(&self) -> IssueFuture<'_> {
            Box::pin(async move {
                self.entered.notify_one();
                let _permit = self
                    .gate
                    .acquire()
                    .await
                    .map_err(|e| sts_auth::Error::Http(e.to_string()))?;
                Ok(Credential::new("gated", "secret", "token", Duration::from_secs(900)))
            })
        }

        fn validity(&self) -> Duration {
            Duration::from_secs(900)
        }
    }

    #[tokio::test]
    async fn fallback_superseded_by_concurrent_rotation_is_pooled() {
        let issuer = Arc::new(GatedIssuer {
            entered: Notify::new(),
            gate: Semaphore::new(0),
        });
        let shared = Arc::new(Shared::new(EngineConfig::default(), issuer.clone()));
        shared
            .slots
            .lock()
            .await
            .active
            .set(credential("old", secs(10)));

        let tick = tokio::spawn({
            let shared = shared.clone();
            async move { rotation_tick(&shared).await }
        });

        issuer.entered.notified().await;
        shared
            .slots
            .lock()
            .await
            .active
            .set(credential("manual", secs(900)));
        issuer.gate.add_permits(1);

        assert_eq!(tick.await.unwrap(), TickOutcome::Superseded);
        assert_eq!(active_id(&shared).await, "manual");
        let slots = shared.slots.lock().await;
        let pooled: Vec<_> = slots.pool.iter().map(|c| c.access_key_id()).collect();
        assert_eq!(pooled, vec!["gated"]);
    }

    #[tokio::test(start_paused = true)]
    async fn rotation_task_stops_on_cancel() {
        let issuer = Arc::new(FakeIssuer::new());
        let shared = shared(EngineConfig::default(), issuer.clone());
        shared
            .slots
            .lock()
            .await
            .active
            .set(credential("active", secs(900)));

        let cancel = CancellationToken::new();
        let handle = spawn_rotation_task(shared.clone(), cancel.clone());
        tokio::time::sleep(secs(10)).await;
        cancel.cancel();
        handle.await.unwrap();

        tokio::time::sleep(secs(1000)).await;
        assert_eq!(issuer.calls(), 0);
        assert_eq!(active_id(&shared).await, "active");
    }
}
