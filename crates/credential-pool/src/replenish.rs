//! Background pool replenishment
//!
//! Spawns a periodic task that prefetches credentials into the pool so that
//! rotation rarely has to wait on the issuer. Each cycle makes at most one
//! issuer call and never retries: a failed fetch is logged and the next cycle
//! tries again.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ReplenishPolicy;
use crate::engine::Shared;

/// Result of one replenishment cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplenishOutcome {
    Added,
    Full,
    Failed,
}

impl ReplenishOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReplenishOutcome::Added => "added",
            ReplenishOutcome::Full => "full",
            ReplenishOutcome::Failed => "failed",
        }
    }
}

/// Spawn the background replenishment task.
///
/// Ticks every `prefetch_interval`, skipping the immediate first tick since
/// the startup credential was just issued. Under `ReplenishPolicy::Bounded`
/// the task exits after `max_fetches` successful fetches.
pub(crate) fn spawn_replenish_task(shared: Arc<Shared>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(shared.config.prefetch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut fetched: u32 = 0;
        loop {
            if let ReplenishPolicy::Bounded { max_fetches } = shared.config.replenish
                && fetched >= max_fetches
            {
                info!(fetched, "background fetch budget exhausted, replenishment stopped");
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = replenish_cycle(&shared) => {
                    if outcome == ReplenishOutcome::Added {
                        fetched += 1;
                    }
                }
            }
        }

        debug!("replenishment task stopped");
    })
}

/// Run one cycle: fetch a credential into the pool unless it is full.
pub(crate) async fn replenish_cycle(shared: &Shared) -> ReplenishOutcome {
    let outcome = fetch_into_pool(shared).await;
    metrics::counter!("credential_replenish_total", "outcome" => outcome.label()).increment(1);
    outcome
}

async fn fetch_into_pool(shared: &Shared) -> ReplenishOutcome {
    if shared.slots.lock().await.pool.is_full() {
        debug!("pool full, skipping prefetch");
        return ReplenishOutcome::Full;
    }

    let credential = match shared.issuer.issue().await {
        Ok(credential) => Arc::new(credential),
        Err(e) => {
            metrics::counter!(
                "credential_issue_failures_total",
                "path" => "replenish",
                "kind" => e.label()
            )
            .increment(1);
            warn!(error = %e, "background prefetch failed, will retry next cycle");
            return ReplenishOutcome::Failed;
        }
    };

    let mut slots = shared.slots.lock().await;
    // Rotation may have issued into the pool while the lock was released.
    if !slots.pool.push(credential.clone()) {
        debug!(
            access_key_id = credential.access_key_id(),
            "pool filled during prefetch, dropping credential"
        );
        return ReplenishOutcome::Full;
    }
    slots.record_pool_size();
    info!(
        access_key_id = credential.access_key_id(),
        pool_size = slots.pool.len(),
        "prefetched credential into pool"
    );
    ReplenishOutcome::Added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::testing::{FakeIssuer, IssuerMode, credential, secs, shared};

    fn config(replenish: ReplenishPolicy, max_pool_size: usize) -> EngineConfig {
        EngineConfig {
            prefetch_interval: secs(120),
            max_pool_size,
            replenish,
            ..EngineConfig::default()
        }
    }

    fn pool_ids(shared: &Shared) -> Vec<String> {
        shared
            .slots
            .try_lock()
            .unwrap()
            .pool
            .iter()
            .map(|c| c.access_key_id().to_string())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_adds_one_credential() {
        let issuer = Arc::new(FakeIssuer::new());
        let shared = shared(EngineConfig::default(), issuer.clone());

        assert_eq!(replenish_cycle(&shared).await, ReplenishOutcome::Added);
        assert_eq!(issuer.calls(), 1);
        assert_eq!(pool_ids(&shared), vec!["ASIA0001"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_skips_issuer_when_full() {
        let issuer = Arc::new(FakeIssuer::new());
        let shared = shared(config(ReplenishPolicy::Continuous, 1), issuer.clone());
        shared.slots.lock().await.pool.push(credential("pooled", secs(900)));

        assert_eq!(replenish_cycle(&shared).await, ReplenishOutcome::Full);
        assert_eq!(issuer.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_cycle_leaves_pool_unchanged() {
        let issuer = Arc::new(FakeIssuer::new());
        let shared = shared(EngineConfig::default(), issuer.clone());
        shared.slots.lock().await.pool.push(credential("pooled", secs(900)));
        issuer.set_mode(IssuerMode::NetworkDown);

        assert_eq!(replenish_cycle(&shared).await, ReplenishOutcome::Failed);
        assert_eq!(issuer.calls(), 1, "replenishment does not retry");
        assert_eq!(pool_ids(&shared), vec!["pooled"]);
    }

    #[tokio::test(start_paused = true)]
    async fn task_survives_failures_and_resumes() {
        let issuer = Arc::new(FakeIssuer::new());
        issuer.set_mode(IssuerMode::NetworkDown);
        let shared = shared(config(ReplenishPolicy::Continuous, 6), issuer.clone());
        let cancel = CancellationToken::new();
        let handle = spawn_replenish_task(shared.clone(), cancel.clone());

        // Cycles at 120s and 240s fail.
        tokio::time::sleep(secs(250)).await;
        assert_eq!(issuer.calls(), 2);
        assert!(pool_ids(&shared).is_empty());

        issuer.set_mode(IssuerMode::Ok);
        tokio::time::sleep(secs(120)).await;
        assert_eq!(issuer.calls(), 3);
        assert_eq!(pool_ids(&shared), vec!["ASIA0003"]);
        assert!(!handle.is_finished());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_is_skipped() {
        let issuer = Arc::new(FakeIssuer::new());
        let shared = shared(EngineConfig::default(), issuer.clone());
        let cancel = CancellationToken::new();
        let _handle = spawn_replenish_task(shared, cancel.clone());

        tokio::time::sleep(secs(119)).await;
        assert_eq!(issuer.calls(), 0);
        tokio::time::sleep(secs(2)).await;
        assert_eq!(issuer.calls(), 1);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_policy_stops_after_budget() {
        let issuer = Arc::new(FakeIssuer::new());
        let shared = shared(
            config(ReplenishPolicy::Bounded { max_fetches: 3 }, 6),
            issuer.clone(),
        );
        let cancel = CancellationToken::new();
        let handle = spawn_replenish_task(shared.clone(), cancel);

        tokio::time::sleep(secs(120 * 10)).await;
        assert!(handle.is_finished(), "task exits once the budget is spent");
        assert_eq!(issuer.calls(), 3);
        assert_eq!(pool_ids(&shared).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_budget_counts_successes_only() {
        let issuer = Arc::new(FakeIssuer::new());
        issuer.fail_next(2);
        let shared = shared(
            config(ReplenishPolicy::Bounded { max_fetches: 2 }, 6),
            issuer.clone(),
        );
        let cancel = CancellationToken::new();
        let handle = spawn_replenish_task(shared.clone(), cancel);

        tokio::time::sleep(secs(120 * 10)).await;
        assert!(handle.is_finished());
        assert_eq!(issuer.calls(), 4);
        assert_eq!(pool_ids(&shared), vec!["ASIA0003", "ASIA0004"]);
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_policy_refills_after_drain() {
        let issuer = Arc::new(FakeIssuer::new());
        let shared = shared(config(ReplenishPolicy::Continuous, 2), issuer.clone());
        let cancel = CancellationToken::new();
        let handle = spawn_replenish_task(shared.clone(), cancel.clone());

        tokio::time::sleep(secs(120 * 4 + 1)).await;
        assert_eq!(issuer.calls(), 2, "full cycles do not call the issuer");
        assert_eq!(pool_ids(&shared).len(), 2);

        shared
            .slots
            .lock()
            .await
            .pool
            .try_take_valid(tokio::time::Instant::now(), secs(30));
        tokio::time::sleep(secs(120)).await;
        assert_eq!(issuer.calls(), 3);
        assert_eq!(pool_ids(&shared).len(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }
}
