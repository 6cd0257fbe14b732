//! §4.6: the generic resource manager every object category (hardware
//! adapter, instrument, module) is collected and owned by. One
//! `ResourceManager<T>` per category, keyed by [`ItemId`], remembering each
//! entry's originating library name and [`Params`] alongside the live
//! `Arc<T>` so a project can be serialized back out later
//! (`labcore-project` reads that bookkeeping; this crate never touches XML
//! itself).
//!
//! Lock ordering (§5 rule 2, "the using object's Data before the used
//! object's Data") means this manager never holds its own lock across an
//! `.await` on a member object — every async operation below snapshots the
//! relevant `Arc<T>`s, drops the manager lock, then awaits.

use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use labcore_error::{Error, Result};
use labcore_object::{IdAllocator, ItemId, Object, Params};
use parking_lot::Mutex;
use snafu::IntoError;

/// One managed resource: the live object plus enough bookkeeping to
/// reconstruct the `Item` XML entry it came from (§6).
pub struct ResourceEntry<T: ?Sized> {
    pub library_name: String,
    pub params: Arc<Params>,
    pub object: Arc<T>,
}

impl<T: ?Sized> Clone for ResourceEntry<T> {
    fn clone(&self) -> Self {
        Self {
            library_name: self.library_name.clone(),
            params: Arc::clone(&self.params),
            object: Arc::clone(&self.object),
        }
    }
}

/// A category's live object table (§4.6). Generic over the object-safe
/// trait the category's objects are stored as — `dyn HardwareAdapter` for
/// [`crate::HardwareManager`], `dyn Runnable` for
/// [`crate::InstrumentManager`]/[`crate::ModuleManager`].
pub struct ResourceManager<T: ?Sized + 'static> {
    allocator: IdAllocator,
    entries: Mutex<HashMap<ItemId, ResourceEntry<T>>>,
}

impl<T: ?Sized + 'static> Default for ResourceManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + 'static> ResourceManager<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            allocator: IdAllocator::new(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a fresh ID for a brand-new object (as opposed to one being
    /// reconstructed at an explicit, previously-persisted ID).
    #[must_use]
    pub fn allocate_id(&self) -> ItemId {
        self.allocator.next()
    }

    /// Raise the allocator's floor to account for an explicitly-specified
    /// ID, e.g. one read back from project XML (§3).
    pub fn observe_id(&self, id: ItemId) {
        self.allocator.observe(id);
    }

    /// `InsertResource`: emplace `object` under `id` and adjust the
    /// next-ID counter so it never collides with `id`.
    pub fn insert_resource(
        &self,
        id: ItemId,
        library_name: impl Into<String>,
        params: Arc<Params>,
        object: Arc<T>,
    ) {
        self.allocator.observe(id);
        self.entries.lock().insert(
            id,
            ResourceEntry {
                library_name: library_name.into(),
                params,
                object,
            },
        );
    }

    #[must_use]
    pub fn ids(&self) -> Vec<ItemId> {
        self.entries.lock().keys().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// `GetResource`: a plain shared reference, no ownership implications.
    #[must_use]
    pub fn get_resource(&self, id: ItemId) -> Option<Arc<T>> {
        self.entries.lock().get(&id).map(|e| Arc::clone(&e.object))
    }

    /// `ShareResource`: the caller intends to hold onto this reference
    /// (typically wrapped in a [`labcore_object::LinkedObjectWrapper`]
    /// immediately after); behaviorally identical to `get_resource` since
    /// use-count tracking lives on the object itself, not the manager.
    #[must_use]
    pub fn share_resource(&self, id: ItemId) -> Option<Arc<T>> {
        self.get_resource(id)
    }

    /// `ExtractResource`: remove `id` from this manager's bookkeeping and
    /// hand sole ownership to the caller, without waiting for the
    /// use-count to drop. Used when tearing a project down forcibly.
    pub fn extract_resource(&self, id: ItemId) -> Option<Arc<T>> {
        self.entries.lock().remove(&id).map(|e| e.object)
    }

    #[must_use]
    pub fn entries_snapshot(&self) -> Vec<(ItemId, String, Arc<Params>)> {
        self.entries
            .lock()
            .iter()
            .map(|(id, e)| (*id, e.library_name.clone(), Arc::clone(&e.params)))
            .collect()
    }

    fn objects_snapshot(&self) -> Vec<(ItemId, Arc<T>)> {
        self.entries
            .lock()
            .iter()
            .map(|(id, e)| (*id, Arc::clone(&e.object)))
            .collect()
    }
}

impl<T: Object + ?Sized + 'static> ResourceManager<T> {
    /// `RemoveResource(id, timeout)`: blocks until `id`'s use-count reaches
    /// zero, then removes and returns it. On timeout the entry is left in
    /// place (§4.6/§8: a `TimeoutException` must not mutate the manager).
    pub async fn remove_resource(&self, id: ItemId, timeout: Duration) -> Result<Arc<T>> {
        let Some(object) = self.get_resource(id) else {
            return Err(labcore_error::NotFoundSnafu {
                message: format!("no resource with id {id}"),
            }
            .into_error(snafu::NoneError));
        };
        object.block_if_unused(timeout).await?;
        self.entries.lock().remove(&id);
        Ok(object)
    }

    /// `GetFailedResourceIDs([onlyInUse])`: every member currently holding
    /// an exception, optionally narrowed to those with nonzero use-count.
    #[must_use]
    pub fn failed_resource_ids(&self, only_in_use: bool) -> Vec<ItemId> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, e)| {
                e.object.base().exception().is_some() && (!only_in_use || e.object.use_count() > 0)
            })
            .map(|(id, _)| *id)
            .collect()
    }

    /// `ResetFailedResources`: `reset(force)` every currently-failed
    /// member; returns the ones that are still failed afterward.
    pub async fn reset_failed_resources(&self, force: bool) -> Vec<(ItemId, Error)> {
        let failed = self.failed_resource_ids(false);
        let mut still_failed = Vec::new();
        for id in failed {
            let Some(object) = self.get_resource(id) else {
                continue;
            };
            if let Err(err) = object.reset(force).await {
                still_failed.push((id, err));
            }
        }
        still_failed
    }

    /// `ClearResourcesWarnings`: clear every member's warning, regardless
    /// of whether it currently has one set.
    pub fn clear_warnings(&self) {
        for (_, object) in self.objects_snapshot() {
            object.clear_warning();
        }
    }

    /// `Startup(cb)`: run `op` against every member. The first failure is
    /// captured but does not stop the sweep; it is re-raised once every
    /// member has been attempted (§7).
    pub async fn startup<F, Fut>(&self, mut op: F) -> Result<()>
    where
        F: FnMut(Arc<T>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut first_error = None;
        for (id, object) in self.objects_snapshot() {
            if let Err(err) = op(object).await {
                tracing::warn!(%id, error = %err, "resource failed to start");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// `Shutdown`: run `op` against every member, best-effort — failures
    /// are logged, not aggregated, since by this point the caller is
    /// already tearing everything down.
    pub async fn shutdown<F, Fut>(&self, mut op: F)
    where
        F: FnMut(Arc<T>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        for (id, object) in self.objects_snapshot() {
            if let Err(err) = op(object).await {
                tracing::warn!(%id, error = %err, "resource failed to shut down cleanly");
            }
        }
    }

    /// `PrepareReset`: block until every member's use-count has reached
    /// zero, so a subsequent `Reset` sweep never trips `InvalidState`.
    pub async fn prepare_reset(&self, timeout: Duration) -> Result<()> {
        for (_, object) in self.objects_snapshot() {
            object.block_if_unused(timeout).await?;
        }
        Ok(())
    }

    /// `Reset`: `reset(force)` every member; returns the ones that failed.
    pub async fn reset_all(&self, force: bool) -> Vec<(ItemId, Error)> {
        let mut failures = Vec::new();
        for (id, object) in self.objects_snapshot() {
            if let Err(err) = object.reset(force).await {
                failures.push((id, err));
            }
        }
        failures
    }
}

/// Lets [`ResourceManager::filter`] downcast a stored trait object back to
/// the concrete type it was constructed as. `HardwareAdapter` and
/// `Runnable` both already carry an `as_any` method (§4.6 "dynamic-cast to
/// T"); this just lets the manager call it without knowing which trait it
/// is managing.
pub trait ResourceAny {
    fn resource_as_any(&self) -> &dyn std::any::Any;
}

impl<T: ResourceAny + ?Sized + 'static> ResourceManager<T> {
    /// `Filter<T>()`: IDs of every member whose concrete type is `U`.
    #[must_use]
    pub fn filter<U: 'static>(&self) -> Vec<ItemId> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, e)| e.object.resource_as_any().downcast_ref::<U>().is_some())
            .map(|(id, _)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use labcore_object::{Category, ObjectBase};

    use super::*;

    struct Dummy {
        base: ObjectBase,
    }

    #[async_trait]
    impl Object for Dummy {
        fn base(&self) -> &ObjectBase {
            &self.base
        }

        async fn on_ensure_ready(&self, _is_auto_startup: bool) -> Result<()> {
            Ok(())
        }

        async fn on_reset(&self) -> Result<()> {
            Ok(())
        }
    }

    impl ResourceAny for Dummy {
        fn resource_as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    fn dummy(manager: &ResourceManager<Dummy>, id: u64, params: Params) -> ItemId {
        let id = ItemId::new(id);
        manager.insert_resource(
            id,
            "Dummy",
            Arc::new(params),
            Arc::new(Dummy {
                base: ObjectBase::new(id, Category::Instrument, "Dummy"),
            }),
        );
        id
    }

    #[test]
    fn insert_raises_the_allocator_floor() {
        let manager = ResourceManager::<Dummy>::new();
        dummy(&manager, 41, Params::new(vec![]));
        assert_eq!(manager.allocate_id().get(), 42);
    }

    #[test]
    fn get_and_extract_resource() {
        let manager = ResourceManager::<Dummy>::new();
        let id = dummy(&manager, 1, Params::new(vec![]));
        assert!(manager.get_resource(id).is_some());
        assert!(manager.extract_resource(id).is_some());
        assert!(manager.get_resource(id).is_none());
    }

    #[tokio::test]
    async fn remove_resource_waits_for_use_count_zero() {
        let manager = ResourceManager::<Dummy>::new();
        let id = dummy(&manager, 1, Params::new(vec![]));
        let removed = manager
            .remove_resource(id, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(removed.id(), id);
        assert!(manager.get_resource(id).is_none());
    }

    #[tokio::test]
    async fn remove_resource_leaves_the_entry_in_place_on_timeout() {
        let manager = ResourceManager::<Dummy>::new();
        let id = dummy(&manager, 1, Params::new(vec![]));
        let target = manager.get_resource(id).unwrap();
        let _wrapper = labcore_object::LinkedObjectWrapper::try_new(target).unwrap();

        let err = manager
            .remove_resource(id, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, labcore_error::Error::Timeout { .. }));
        assert!(manager.get_resource(id).is_some());
    }

    #[tokio::test]
    async fn reset_failed_resources_clears_the_exception() {
        let manager = ResourceManager::<Dummy>::new();
        let id = dummy(&manager, 1, Params::new(vec![]));
        manager
            .get_resource(id)
            .unwrap()
            .base()
            .set_exception(
                labcore_error::InvalidStateSnafu {
                    message: "boom".to_string(),
                }
                .into_error(snafu::NoneError),
            );
        assert_eq!(manager.failed_resource_ids(false), vec![id]);
        let failures = manager.reset_failed_resources(false).await;
        assert!(failures.is_empty());
        assert!(manager.failed_resource_ids(false).is_empty());
    }

    #[test]
    fn filter_downcasts_to_the_concrete_type() {
        let manager = ResourceManager::<Dummy>::new();
        let id = dummy(&manager, 1, Params::new(vec![]));
        assert_eq!(manager.filter::<Dummy>(), vec![id]);
    }
}
