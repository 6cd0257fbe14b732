//! §4.6: the instrument category's resource manager. Instruments are
//! stored behind `dyn Runnable` — the manager only ever needs lifecycle
//! operations, never a particular instrument's payload, so it never needs
//! to know which `InstrumentBody` a given entry was built with.

use std::time::Duration;

use labcore_runnable::Runnable;

use crate::resource_manager::{ResourceAny, ResourceManager};

impl ResourceAny for dyn Runnable {
    fn resource_as_any(&self) -> &dyn std::any::Any {
        self.as_any()
    }
}

/// `ResourceManager<dyn Runnable>` scoped to instruments, plus the
/// instrument-specific convenience methods the spec calls out by name.
#[derive(Default)]
pub struct InstrumentManager {
    resources: ResourceManager<dyn Runnable>,
}

impl InstrumentManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            resources: ResourceManager::new(),
        }
    }

    #[must_use]
    pub fn resources(&self) -> &ResourceManager<dyn Runnable> {
        &self.resources
    }

    /// `GetNumRunningInstruments`.
    #[must_use]
    pub fn num_running(&self) -> usize {
        self.resources
            .ids()
            .into_iter()
            .filter_map(|id| self.resources.get_resource(id))
            .filter(|instrument| instrument.is_running())
            .count()
    }

    /// `AllInitialized`: every instrument is running and exception-free.
    #[must_use]
    pub fn all_initialized(&self) -> bool {
        self.resources
            .ids()
            .into_iter()
            .filter_map(|id| self.resources.get_resource(id))
            .all(|instrument| instrument.is_ready())
    }

    /// `TerminateAll`: best-effort; failures are logged by
    /// [`ResourceManager::shutdown`], not propagated.
    pub async fn terminate_all(&self, force: bool, join_timeout: Duration) {
        self.resources
            .shutdown(|instrument| async move { instrument.terminate(force, join_timeout).await })
            .await;
    }
}
