//! §4.6: the hardware-adapter category's resource manager.

use labcore_hardware::HardwareAdapter;

use crate::resource_manager::{ResourceAny, ResourceManager};

impl ResourceAny for dyn HardwareAdapter {
    fn resource_as_any(&self) -> &dyn std::any::Any {
        self.as_any()
    }
}

/// `ResourceManager<dyn HardwareAdapter>`, plus the one hardware-specific
/// convenience the spec calls out by name.
#[derive(Default)]
pub struct HardwareManager {
    resources: ResourceManager<dyn HardwareAdapter>,
}

impl HardwareManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            resources: ResourceManager::new(),
        }
    }

    #[must_use]
    pub fn resources(&self) -> &ResourceManager<dyn HardwareAdapter> {
        &self.resources
    }

    /// `AllConnected`: every adapter is currently connected and exception-free.
    #[must_use]
    pub fn all_connected(&self) -> bool {
        self.resources
            .ids()
            .into_iter()
            .filter_map(|id| self.resources.get_resource(id))
            .all(|adapter| adapter.is_connected() && adapter.base().exception().is_none())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use labcore_hardware::{LineEnding, MockChannel, SerialAdapter};
    use labcore_object::{Category, ItemId, ObjectBase, Params};

    use super::*;

    fn adapter(id: u64) -> Arc<SerialAdapter> {
        SerialAdapter::new(
            ObjectBase::new(ItemId::new(id), Category::HardwareAdapter, "Serial"),
            LineEnding::Lf,
            Arc::new(MockChannel::new()),
        )
    }

    #[test]
    fn all_connected_is_false_until_every_adapter_reports_connected() {
        let manager = HardwareManager::new();
        let a = adapter(1);
        manager
            .resources()
            .insert_resource(ItemId::new(1), "Serial", Arc::new(Params::new(vec![])), a);
        assert!(!manager.all_connected());
    }
}
