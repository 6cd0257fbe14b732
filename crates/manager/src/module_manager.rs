//! §4.6: the module category's resource manager. Modules are stored
//! behind `dyn Runnable`, same rationale as [`crate::InstrumentManager`].
//!
//! Window geometry is the one piece of GUI-shell state the core still
//! persists (§6, project XML): the core treats it as an opaque per-module
//! string blob and never interprets it — the out-of-scope graphical shell
//! (§1) is the only reader.

use std::{collections::HashMap, sync::Arc, time::Duration};

use labcore_object::ItemId;
use labcore_runnable::Runnable;
use parking_lot::Mutex;

use crate::resource_manager::ResourceManager;

/// `ResourceManager<dyn Runnable>` scoped to modules, plus the
/// module-specific convenience methods the spec calls out by name.
#[derive(Default)]
pub struct ModuleManager {
    resources: ResourceManager<dyn Runnable>,
    window_state: Mutex<HashMap<ItemId, String>>,
}

impl ModuleManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            resources: ResourceManager::new(),
            window_state: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn resources(&self) -> &ResourceManager<dyn Runnable> {
        &self.resources
    }

    /// `GetNumRunningModules`.
    #[must_use]
    pub fn num_running(&self) -> usize {
        self.resources
            .ids()
            .into_iter()
            .filter_map(|id| self.resources.get_resource(id))
            .filter(|module| module.is_running())
            .count()
    }

    /// `TerminateAll`: best-effort; failures are logged by
    /// [`ResourceManager::shutdown`], not propagated.
    pub async fn terminate_all(&self, force: bool, join_timeout: Duration) {
        self.resources
            .shutdown(|module| async move { module.terminate(force, join_timeout).await })
            .await;
    }

    /// Record `id`'s last-known window geometry, an opaque string the
    /// graphical shell alone interprets.
    pub fn save_window_state(&self, id: ItemId, state: impl Into<String>) {
        self.window_state.lock().insert(id, state.into());
    }

    #[must_use]
    pub fn window_state(&self, id: ItemId) -> Option<String> {
        self.window_state.lock().get(&id).cloned()
    }

    pub fn clear_window_state(&self, id: ItemId) {
        self.window_state.lock().remove(&id);
    }

    #[must_use]
    pub fn window_states_snapshot(&self) -> Arc<HashMap<ItemId, String>> {
        Arc::new(self.window_state.lock().clone())
    }
}
