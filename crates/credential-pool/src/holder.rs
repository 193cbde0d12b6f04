//! Active credential slot and change notification

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use sts_auth::Credential;
use tracing::error;

/// Callback fired with the new credential on every swap.
///
/// Runs synchronously inside the engine's critical section, so it must be
/// quick and must not block on the engine.
pub type ChangeHook = Box<dyn Fn(&Credential) + Send + Sync>;

/// The single published credential plus its change hook.
///
/// Empty only until the first issuance completes.
#[derive(Default)]
pub struct ActiveCredentialHolder {
    current: Option<Arc<Credential>>,
    hook: Option<ChangeHook>,
}

impl ActiveCredentialHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<Credential>> {
        self.current.clone()
    }

    /// Replace the active credential and fire the hook exactly once.
    ///
    /// The slot is updated before the hook runs. A panicking hook is caught
    /// and logged; the new credential stays active.
    pub fn set(&mut self, credential: Arc<Credential>) -> Option<Arc<Credential>> {
        let previous = self.current.replace(credential.clone());
        if let Some(hook) = &self.hook
            && catch_unwind(AssertUnwindSafe(|| hook(&credential))).is_err()
        {
            error!(
                access_key_id = credential.access_key_id(),
                "change hook panicked; credential is active but was not published"
            );
        }
        previous
    }

    /// Register the change hook, replacing any previous one.
    pub fn on_change(&mut self, hook: ChangeHook) {
        self.hook = Some(hook);
    }
}
