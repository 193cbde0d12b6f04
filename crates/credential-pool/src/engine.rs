//! Engine lifecycle, manual rotation and health reporting

use std::sync::Arc;
use std::time::SystemTime;

use sts_auth::{Credential, CredentialIssuer};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::holder::ActiveCredentialHolder;
use crate::pool::CredentialPool;
use crate::replenish::spawn_replenish_task;
use crate::retry::issue_with_retry;
use crate::rotation::{RotationSource, Trigger, spawn_rotation_task};

/// Pool and active slot, always locked together.
pub(crate) struct Slots {
    pub(crate) pool: CredentialPool,
    pub(crate) active: ActiveCredentialHolder,
}

impl Slots {
    pub(crate) fn record_pool_size(&self) {
        metrics::gauge!("credential_pool_size").set(self.pool.len() as f64);
    }

    /// Activate `next`, firing the change hook and recording the swap.
    pub(crate) fn install(&mut self, next: Arc<Credential>, trigger: Trigger, source: RotationSource) {
        let access_key_id = next.access_key_id().to_string();
        let remaining_secs = next.remaining(Instant::now()).as_secs();
        let previous = self.active.set(next);

        metrics::counter!(
            "credential_rotations_total",
            "trigger" => trigger.label(),
            "source" => source.label()
        )
        .increment(1);
        self.record_pool_size();

        info!(
            trigger = trigger.label(),
            source = source.label(),
            access_key_id,
            previous = previous.as_ref().map(|c| c.access_key_id()),
            remaining_secs,
            pool_size = self.pool.len(),
            "activated credential"
        );
    }
}

/// State shared between the engine handle and its background tasks.
pub(crate) struct Shared {
    pub(crate) slots: Mutex<Slots>,
    pub(crate) issuer: Arc<dyn CredentialIssuer>,
    pub(crate) config: EngineConfig,
}

impl Shared {
    pub(crate) fn new(config: EngineConfig, issuer: Arc<dyn CredentialIssuer>) -> Self {
        Self {
            slots: Mutex::new(Slots {
                pool: CredentialPool::new(config.max_pool_size),
                active: ActiveCredentialHolder::new(),
            }),
            issuer,
            config,
        }
    }
}

/// Summary of a completed manual rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotation {
    pub source: RotationSource,
    pub access_key_id: String,
    pub expires_at: SystemTime,
}

impl Rotation {
    fn of(credential: &Credential, source: RotationSource) -> Self {
        Self {
            source,
            access_key_id: credential.access_key_id().to_string(),
            expires_at: credential.expires_at_wall(),
        }
    }
}

/// Running credential engine.
///
/// Owns the rotation and replenishment tasks. Dropping the engine cancels
/// them; `shutdown` additionally waits for them to finish.
pub struct Engine {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Validate `config`, issue and activate the first credential, then spawn
    /// the background tasks.
    ///
    /// `hook` fires once here with the startup credential and again on every
    /// later swap. If the first issuance fails after retries, nothing is
    /// spawned and the error is returned.
    pub async fn start<F>(
        config: EngineConfig,
        issuer: Arc<dyn CredentialIssuer>,
        hook: F,
    ) -> Result<Engine>
    where
        F: Fn(&Credential) + Send + Sync + 'static,
    {
        config.validate(issuer.validity())?;

        let first = issue_with_retry(issuer.as_ref(), &config.retry, "startup")
            .await
            .map_err(Error::Startup)?;

        let shared = Arc::new(Shared::new(config, issuer));
        {
            let mut slots = shared.slots.lock().await;
            slots.active.on_change(Box::new(hook));
            slots.install(Arc::new(first), Trigger::Startup, RotationSource::Issuer);
        }

        let cancel = CancellationToken::new();
        let tasks = vec![
            spawn_rotation_task(shared.clone(), cancel.clone()),
            spawn_replenish_task(shared.clone(), cancel.clone()),
        ];

        info!(
            check_interval_secs = shared.config.check_interval.as_secs(),
            rotation_margin_secs = shared.config.rotation_margin.as_secs(),
            prefetch_interval_secs = shared.config.prefetch_interval.as_secs(),
            max_pool_size = shared.config.max_pool_size,
            replenish = shared.config.replenish.label(),
            "credential engine started"
        );

        Ok(Engine {
            shared,
            cancel,
            tasks: Mutex::new(tasks),
        })
    }

    /// Swap the active credential now, regardless of its remaining validity.
    ///
    /// Prefers the earliest-expiring pooled credential that clears the
    /// rotation margin, then the freshest pooled credential. Only an empty
    /// pool leads to an issuer call (with retry); on failure the active
    /// credential is left unchanged.
    pub async fn manual_rotate(&self) -> Result<Rotation> {
        if self.cancel.is_cancelled() {
            return Err(Error::Shutdown);
        }

        {
            let mut slots = self.shared.slots.lock().await;
            let now = Instant::now();
            let pool = &mut slots.pool;
            pool.prune_expired(now);
            let candidate = match pool.try_take_valid(now, self.shared.config.rotation_margin) {
                Some(credential) => Some(credential),
                None => pool.take_freshest(),
            };
            if let Some(next) = candidate {
                let rotation = Rotation::of(&next, RotationSource::Pool);
                slots.install(next, Trigger::Manual, RotationSource::Pool);
                return Ok(rotation);
            }
        }

        debug!("pool empty, issuing credential for manual rotation");
        let issued = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Shutdown),
            result = issue_with_retry(self.shared.issuer.as_ref(), &self.shared.config.retry, "manual") => {
                Arc::new(result?)
            }
        };

        let rotation = Rotation::of(&issued, RotationSource::Issuer);
        self.shared
            .slots
            .lock()
            .await
            .install(issued, Trigger::Manual, RotationSource::Issuer);
        Ok(rotation)
    }

    /// The currently published credential.
    pub async fn active(&self) -> Option<Arc<Credential>> {
        self.shared.slots.lock().await.active.get()
    }

    /// Number of pooled (not active) credentials.
    pub async fn pool_size(&self) -> usize {
        self.shared.slots.lock().await.pool.len()
    }

    /// Wall-clock expiry of the active credential.
    pub async fn active_expires_at(&self) -> Option<SystemTime> {
        self.active().await.map(|c| c.expires_at_wall())
    }

    /// Replace the change hook. Later swaps notify only the new hook.
    pub async fn on_change<F>(&self, hook: F)
    where
        F: Fn(&Credential) + Send + Sync + 'static,
    {
        self.shared.slots.lock().await.active.on_change(Box::new(hook));
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Health summary for the health endpoint.
    ///
    /// Status mapping: active credential clears the rotation margin → healthy,
    /// inside the margin → degraded, expired or missing → unhealthy.
    pub async fn health(&self) -> serde_json::Value {
        let slots = self.shared.slots.lock().await;
        let now = Instant::now();
        let margin = self.shared.config.rotation_margin;

        let active = slots.active.get();
        let remaining = active.as_ref().map(|c| c.remaining(now));
        let status = match remaining {
            Some(r) if r > margin => "healthy",
            Some(r) if !r.is_zero() => "degraded",
            _ => "unhealthy",
        };

        serde_json::json!({
            "status": status,
            "running": self.is_running(),
            "active_access_key_id": active.as_ref().map(|c| c.access_key_id()),
            "active_remaining_secs": remaining.map(|r| r.as_secs()),
            "rotation_margin_secs": margin.as_secs(),
            "pool_size": slots.pool.len(),
            "pool_capacity": slots.pool.capacity(),
            "replenish": self.shared.config.replenish.label(),
        })
    }

    /// Stop the background tasks and wait for them to exit.
    ///
    /// Issuer calls in flight are abandoned. Idempotent.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "engine task ended abnormally");
            }
        }
        info!("credential engine stopped");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
