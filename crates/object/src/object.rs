//! Abstract object base (§3/§4.2) and the `LinkedObjectWrapper` RAII
//! use-count guard.
//!
//! `ObjectBase` holds every field common to hardware adapters, instruments
//! and modules: its stable `ItemId`, owning (UI) thread identity,
//! (category, library name), current warning/exception, and use-count.
//! Concrete object types embed an `ObjectBase` by composition and implement
//! the [`Object`] trait's two subclass hooks; every other `Object` method is
//! default-implemented in terms of `base()`.

use std::{thread::ThreadId, time::Duration};

use async_trait::async_trait;
use labcore_error::{Error, Result};
use parking_lot::Mutex;
use snafu::IntoError;

use crate::{category::Category, item_id::ItemId, use_count::UseCounter};

/// Fields and bookkeeping every [`Object`] shares, regardless of whether it
/// is a hardware adapter, instrument, or module.
pub struct ObjectBase {
    id: ItemId,
    category: Category,
    library_name: String,
    object_name: Mutex<String>,
    owner_thread: ThreadId,
    warning: Mutex<Option<Error>>,
    exception: Mutex<Option<Error>>,
    resetting: Mutex<bool>,
    use_count: std::sync::Arc<UseCounter>,
}

const OBSERVER_LOCK_TIMEOUT: Duration = Duration::from_millis(10);

impl ObjectBase {
    #[must_use]
    pub fn new(id: ItemId, category: Category, library_name: impl Into<String>) -> Self {
        Self {
            id,
            category,
            library_name: library_name.into(),
            object_name: Mutex::new(String::new()),
            owner_thread: std::thread::current().id(),
            warning: Mutex::new(None),
            exception: Mutex::new(None),
            resetting: Mutex::new(false),
            use_count: UseCounter::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> ItemId {
        self.id
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    #[must_use]
    pub fn library_name(&self) -> &str {
        &self.library_name
    }

    #[must_use]
    pub fn owner_thread(&self) -> ThreadId {
        self.owner_thread
    }

    #[must_use]
    pub fn object_name(&self) -> String {
        self.object_name.lock().clone()
    }

    pub fn set_object_name(&self, name: impl Into<String>) {
        *self.object_name.lock() = name.into();
    }

    #[must_use]
    pub fn use_count(&self) -> usize {
        self.use_count.get()
    }

    #[must_use]
    pub(crate) fn use_counter(&self) -> &std::sync::Arc<UseCounter> {
        &self.use_count
    }

    #[must_use]
    pub fn is_resetting(&self) -> bool {
        *self.resetting.lock()
    }

    pub fn exception(&self) -> Option<Error> {
        self.exception.lock().clone()
    }

    /// §4.2 `GetException(timeout)`: a thread-safe observer; times out
    /// rather than blocking the caller indefinitely.
    pub fn exception_with_timeout(&self, timeout: Duration) -> Result<Option<Error>> {
        self.exception
            .try_lock_for(timeout)
            .map(|guard| guard.clone())
            .ok_or_else(|| timeout_error("object exception lock", timeout))
    }

    pub fn warning(&self) -> Option<Error> {
        self.warning.lock().clone()
    }

    pub fn set_exception(&self, error: Error) {
        *self.exception.lock() = Some(error);
    }

    pub fn clear_exception(&self) {
        *self.exception.lock() = None;
    }

    pub fn set_warning(&self, error: Error) {
        *self.warning.lock() = Some(error);
    }

    pub fn clear_warning(&self) {
        *self.warning.lock() = None;
    }

    pub async fn block_if_unused(&self, timeout: Duration) -> Result<()> {
        self.use_count.wait_zero(timeout).await
    }
}

fn timeout_error(what: &str, timeout: Duration) -> Error {
    labcore_error::TimeoutSnafu {
        message: format!("failed to acquire {what}"),
        duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    }
    .into_error(snafu::NoneError)
}

/// Common interface for hardware adapters, instruments and modules (§3/§4.2).
///
/// `on_ensure_ready`/`on_reset` are the only methods a concrete object type
/// must implement; every other method has a sensible default driven by
/// `base()`.
#[async_trait]
pub trait Object: Send + Sync {
    fn base(&self) -> &ObjectBase;

    /// Transition the object to a ready-to-use state, or fail and store the
    /// failure as this object's exception. Hardware adapters request their
    /// channel be opened; runnables start their worker thread.
    async fn on_ensure_ready(&self, is_auto_startup: bool) -> Result<()>;

    /// Release subclass-owned resources. Called by `reset()` after the
    /// use-count check has already passed and before warning/exception are
    /// cleared.
    async fn on_reset(&self) -> Result<()>;

    fn id(&self) -> ItemId {
        self.base().id()
    }

    fn category(&self) -> Category {
        self.base().category()
    }

    fn library_name(&self) -> &str {
        self.base().library_name()
    }

    fn object_name(&self) -> String {
        self.base().object_name()
    }

    fn use_count(&self) -> usize {
        self.base().use_count()
    }

    /// True once the object has no stored exception. Concrete runnables
    /// narrow this further (a non-started worker also isn't ready).
    fn is_ready(&self) -> bool {
        self.base().exception().is_none()
    }

    fn get_exception(&self, timeout: Duration) -> Result<Option<Error>> {
        self.base().exception_with_timeout(timeout)
    }

    fn get_warning(&self) -> Option<Error> {
        self.base().warning()
    }

    fn set_warning(&self, error: Error) {
        self.base().set_warning(error);
    }

    fn clear_warning(&self) {
        self.base().clear_warning();
    }

    /// §4.2: idempotent; hardware adapters refuse if the object already
    /// stores an exception (it must be `reset()` first), runnables always
    /// attempt to (re)start their worker thread.
    async fn ensure_ready_state(&self, is_auto_startup: bool) -> Result<()> {
        if self.base().category() == Category::HardwareAdapter {
            if let Some(exception) = self.base().exception() {
                return Err(exception);
            }
        }
        self.on_ensure_ready(is_auto_startup).await
    }

    /// §4.2: requires use-count zero unless `force`; clears exception and
    /// warning only after the subclass reset succeeds.
    async fn reset(&self, force: bool) -> Result<()> {
        if !force && self.base().use_count() != 0 {
            return Err(labcore_error::InvalidStateSnafu {
                message: format!(
                    "cannot reset object {} with use-count {}",
                    self.base().id(),
                    self.base().use_count()
                ),
            }
            .into_error(snafu::NoneError));
        }
        *self.base().resetting.lock() = true;
        let result = self.on_reset().await;
        *self.base().resetting.lock() = false;
        result?;
        self.base().clear_exception();
        self.base().clear_warning();
        Ok(())
    }

    async fn block_if_unused(&self, timeout: Duration) -> Result<()> {
        self.base().block_if_unused(timeout).await
    }
}

/// RAII "this object uses that object" record (§3/§4.2). Holds a shared
/// handle to the target and increments its use-count for the wrapper's
/// lifetime; dropping it decrements the count and wakes any
/// `block_if_unused` waiter.
///
/// Construction fails with [`Error::LinkedObjectNotLocked`] if the target is
/// currently being reset — callers are expected to treat this as
/// cooperative backoff and retry.
pub struct LinkedObjectWrapper<T: ?Sized> {
    target: std::sync::Arc<T>,
}

impl<T: Object + ?Sized> LinkedObjectWrapper<T> {
    pub fn try_new(target: std::sync::Arc<T>) -> Result<Self> {
        if target.base().is_resetting() {
            return Err(labcore_error::LinkedObjectNotLockedSnafu {
                message: format!("object {} is being reset", target.base().id()),
            }
            .into_error(snafu::NoneError));
        }
        target.base().use_counter().increment();
        Ok(Self { target })
    }

    #[must_use]
    pub fn get(&self) -> &T {
        &self.target
    }

    #[must_use]
    pub fn arc(&self) -> std::sync::Arc<T> {
        std::sync::Arc::clone(&self.target)
    }
}

impl<T: Object + ?Sized> Drop for LinkedObjectWrapper<T> {
    fn drop(&mut self) {
        self.target.base().use_counter().decrement();
    }
}

#[cfg(test)]
mod tests {
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

    fn dummy(id: u64) -> std::sync::Arc<Dummy> {
        std::sync::Arc::new(Dummy {
            base: ObjectBase::new(ItemId::new(id), Category::Instrument, "dummy"),
        })
    }

    #[tokio::test]
    async fn reset_with_nonzero_use_count_fails() {
        let obj = dummy(1);
        let _wrapper = LinkedObjectWrapper::try_new(std::sync::Arc::clone(&obj)).unwrap();
        assert_eq!(obj.use_count(), 1);
        let err = obj.reset(false).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
    }

    #[tokio::test]
    async fn reset_succeeds_once_wrapper_is_dropped() {
        let obj = dummy(2);
        {
            let _wrapper = LinkedObjectWrapper::try_new(std::sync::Arc::clone(&obj)).unwrap();
        }
        assert_eq!(obj.use_count(), 0);
        obj.reset(false).await.unwrap();
    }

    #[tokio::test]
    async fn reset_clears_exception_and_warning() {
        let obj = dummy(3);
        obj.set_warning(labcore_error::InvalidArgSnafu { message: "w".to_string() }.into_error(snafu::NoneError));
        obj.base().set_exception(labcore_error::InvalidArgSnafu { message: "e".to_string() }.into_error(snafu::NoneError));
        obj.reset(false).await.unwrap();
        assert!(obj.get_warning().is_none());
        assert!(obj.get_exception(Duration::from_millis(10)).unwrap().is_none());
    }
}
