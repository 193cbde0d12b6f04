//! Engine timing and capacity settings

use std::time::Duration;

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// How often the rotation task inspects the active credential.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// Remaining validity below which the active credential is replaced.
pub const DEFAULT_ROTATION_MARGIN: Duration = Duration::from_secs(30);

/// Cadence of background prefetching.
pub const DEFAULT_PREFETCH_INTERVAL: Duration = Duration::from_secs(120);

/// Maximum number of pooled (not yet active) credentials.
pub const DEFAULT_MAX_POOL_SIZE: usize = 6;

/// Successful background fetches per engine lifetime under `ReplenishPolicy::Bounded`.
pub const DEFAULT_MAX_BACKGROUND_FETCHES: u32 = 6;

/// How the replenishment task tops up the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplenishPolicy {
    /// Front-load the pool: stop after `max_fetches` successful fetches.
    /// Long-running engines eventually drain the pool and fall back to
    /// synchronous issuance on every rotation.
    Bounded { max_fetches: u32 },
    /// Keep fetching every interval for the engine's whole lifetime,
    /// skipping cycles while the pool is full.
    Continuous,
}

impl ReplenishPolicy {
    pub fn label(&self) -> &'static str {
        match self {
            ReplenishPolicy::Bounded { .. } => "bounded",
            ReplenishPolicy::Continuous => "continuous",
        }
    }
}

impl Default for ReplenishPolicy {
    fn default() -> Self {
        ReplenishPolicy::Bounded {
            max_fetches: DEFAULT_MAX_BACKGROUND_FETCHES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub check_interval: Duration,
    pub rotation_margin: Duration,
    pub prefetch_interval: Duration,
    pub max_pool_size: usize,
    pub replenish: ReplenishPolicy,
    /// Applied to startup, rotation fallback and manual issuance
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            rotation_margin: DEFAULT_ROTATION_MARGIN,
            prefetch_interval: DEFAULT_PREFETCH_INTERVAL,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            replenish: ReplenishPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Check the settings against the issuer's credential `validity`.
    ///
    /// A margin at or above the validity would make every fresh credential
    /// eligible for rotation immediately.
    pub fn validate(&self, validity: Duration) -> Result<()> {
        if self.check_interval.is_zero() {
            return Err(Error::Config("check_interval must be greater than 0".into()));
        }
        if self.prefetch_interval.is_zero() {
            return Err(Error::Config(
                "prefetch_interval must be greater than 0".into(),
            ));
        }
        if self.max_pool_size == 0 {
            return Err(Error::Config("max_pool_size must be greater than 0".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config(
                "retry.max_attempts must be greater than 0".into(),
            ));
        }
        if self.rotation_margin >= validity {
            return Err(Error::Config(format!(
                "rotation_margin ({}s) must be shorter than credential validity ({}s)",
                self.rotation_margin.as_secs(),
                validity.as_secs()
            )));
        }
        Ok(())
    }
}
